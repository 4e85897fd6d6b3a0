use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::CoreError;
use crate::metrics::{AI_REQUESTS_TOTAL, AI_REQUEST_DURATION_SECONDS};

/// What a generation request is for; used for metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Curriculum,
    Quiz,
    Mentor,
}

impl PromptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptKind::Curriculum => "curriculum",
            PromptKind::Quiz => "quiz",
            PromptKind::Mentor => "mentor",
        }
    }
}

/// Text generation backend. `api_key` is the caller's own key, which takes
/// precedence over any key the backend was configured with.
#[async_trait]
pub trait AiGenerator: Send + Sync {
    async fn generate(
        &self,
        kind: PromptKind,
        prompt: &str,
        api_key: Option<&str>,
    ) -> Result<String, CoreError>;
}

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.gemini_base_url.clone(),
            config.gemini_model.clone(),
            config.gemini_api_key.clone(),
            Duration::from_secs(config.ai_timeout_secs),
        )
    }

    async fn call(&self, prompt: &str, key: &str) -> Result<String, CoreError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .http
            .post(url)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::Upstream(format!(
                "Gemini returned {}: {}",
                status.as_u16(),
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Upstream(format!("unreadable response: {}", e)))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(CoreError::Upstream("response contained no text".into()));
        }
        Ok(text)
    }
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[async_trait]
impl AiGenerator for GeminiClient {
    async fn generate(
        &self,
        kind: PromptKind,
        prompt: &str,
        api_key: Option<&str>,
    ) -> Result<String, CoreError> {
        let key = api_key
            .filter(|k| !k.is_empty())
            .or(self.api_key.as_deref())
            .ok_or(CoreError::MissingApiKey)?;

        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.call(prompt, key)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::UpstreamTimeout(self.timeout.as_secs())),
        };

        AI_REQUEST_DURATION_SECONDS
            .with_label_values(&[kind.as_str()])
            .observe(start.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => "success",
            Err(CoreError::UpstreamTimeout(_)) => "timeout",
            Err(_) => "error",
        };
        AI_REQUESTS_TOTAL
            .with_label_values(&[kind.as_str(), outcome])
            .inc();

        if let Err(e) = &result {
            tracing::warn!(kind = kind.as_str(), error = %e, "AI generation failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL_PATH: &str = "/v1beta/models/gemini-test:generateContent";

    fn client(server: &MockServer, key: Option<&str>, timeout: Duration) -> GeminiClient {
        GeminiClient::new(server.uri(), "gemini-test", key.map(String::from), timeout)
    }

    #[tokio::test]
    async fn joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .and(query_param("key", "server-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] }
                }]
            })))
            .mount(&server)
            .await;

        let text = client(&server, Some("server-key"), Duration::from_secs(5))
            .generate(PromptKind::Curriculum, "prompt", None)
            .await
            .unwrap();
        assert_eq!(text, "{\"a\":1}");
    }

    #[tokio::test]
    async fn user_key_overrides_configured_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .and(query_param("key", "user-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server, Some("server-key"), Duration::from_secs(5))
            .generate(PromptKind::Mentor, "prompt", Some("user-key"))
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server, None, Duration::from_secs(5))
            .generate(PromptKind::Quiz, "prompt", None)
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::MissingApiKey);
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server, Some("k"), Duration::from_secs(5))
            .generate(PromptKind::Quiz, "prompt", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Upstream(msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(serde_json::json!({ "candidates": [] })),
            )
            .mount(&server)
            .await;

        let err = client(&server, Some("k"), Duration::from_millis(200))
            .generate(PromptKind::Curriculum, "prompt", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UpstreamTimeout(_)));
    }
}
