use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Credit ledger
    pub static ref CREDIT_DEBITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "credit_debits_total",
        "Credits spent, by paid action",
        &["action"]
    )
    .unwrap();

    pub static ref CREDIT_DEBITS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "credit_debits_rejected_total",
        "Paid actions refused for insufficient credits",
        &["action", "stage"]
    )
    .unwrap();

    pub static ref CREDIT_REFUNDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "credit_refunds_total",
        "Credits returned after a paid action failed to persist",
        &["action"]
    )
    .unwrap();

    // Quizzes
    pub static ref QUIZ_SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_submissions_total",
        "Quiz submissions, by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref QUIZ_SCORE: Histogram = register_histogram!(
        "quiz_score_percent",
        "Distribution of quiz scores",
        vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0]
    )
    .unwrap();

    // External AI
    pub static ref AI_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ai_requests_total",
        "Generation requests sent to the AI provider",
        &["kind", "outcome"]
    )
    .unwrap();

    pub static ref AI_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "ai_request_duration_seconds",
        "AI provider latency in seconds",
        &["kind"],
        vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}
