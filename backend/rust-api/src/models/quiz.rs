use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::bson_datetime_as_chrono;
use super::curriculum::CurriculumView;
use super::user::UserSummary;

/// Highest answer index accepted at the request boundary. Every question is
/// generated with four options, so the bound is global rather than derived
/// from the individual question.
pub const MAX_OPTION_INDEX: u8 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: u8,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeakTopic {
    pub topic: String,
    pub wrong_count: u32,
}

/// Quiz stored in the "quizzes" collection; at most one per curriculum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(rename = "_id")]
    pub id: String,
    pub curriculum_id: String,
    pub questions: Vec<Question>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

/// Append-only record of one scored submission ("quiz_results")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResult {
    #[serde(rename = "_id")]
    pub id: String,
    pub quiz_id: String,
    pub user_id: String,
    pub answers: Vec<u8>,
    pub score: f64,
    pub weak_topics: Vec<WeakTopic>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

/// Payload produced by the AI for a quiz
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedQuiz {
    pub questions: Vec<Question>,
}

fn validate_answer_indices(answers: &[u8]) -> Result<(), ValidationError> {
    if answers.iter().any(|a| *a > MAX_OPTION_INDEX) {
        let mut err = ValidationError::new("range");
        err.message = Some("Answer index must be between 0 and 3".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitQuizRequest {
    #[validate(custom(function = "validate_answer_indices"))]
    pub answers: Vec<u8>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultView {
    pub id: String,
    pub quiz_id: String,
    pub answers: Vec<u8>,
    pub score: f64,
    pub weak_topics: Vec<WeakTopic>,
    pub created_at: DateTime<Utc>,
}

impl From<QuizResult> for QuizResultView {
    fn from(r: QuizResult) -> Self {
        QuizResultView {
            id: r.id,
            quiz_id: r.quiz_id,
            answers: r.answers,
            score: r.score,
            weak_topics: r.weak_topics,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizView {
    pub id: String,
    pub curriculum_id: String,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<QuizResultView>>,
}

impl QuizView {
    pub fn new(quiz: Quiz, results: Option<Vec<QuizResult>>) -> Self {
        QuizView {
            id: quiz.id,
            curriculum_id: quiz.curriculum_id,
            questions: quiz.questions,
            created_at: quiz.created_at,
            results: results.map(|rs| rs.into_iter().map(QuizResultView::from).collect()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizResponse {
    pub result: QuizResultView,
    pub score: f64,
    pub weak_topics: Vec<WeakTopic>,
    pub recommendations: String,
}

/// GET /admin/curriculum/{id}
#[derive(Debug, Serialize)]
pub struct AdminCurriculumDetail {
    #[serde(flatten)]
    pub curriculum: CurriculumView,
    pub user: Option<UserSummary>,
    pub quizzes: Vec<QuizView>,
}
