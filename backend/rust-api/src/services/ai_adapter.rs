//! Turns free-form model output into typed payloads.
//!
//! Models tend to wrap JSON in prose or markdown fences. The adapter takes
//! the first JSON object in the text and deserializes it into the requested
//! shape. It does not repair broken JSON and never retries.

use serde::de::DeserializeOwned;
use serde_json::{Deserializer, Value};

use crate::errors::CoreError;
use crate::models::quiz::GeneratedQuiz;

/// Extracts the first complete JSON object from `raw` and deserializes it
/// into `T`. Text after the object is ignored.
pub fn extract_structured<T: DeserializeOwned>(raw: &str) -> Result<T, CoreError> {
    let start = raw
        .find('{')
        .ok_or_else(|| CoreError::AiResponseMalformed("no JSON object in response".into()))?;

    let value = Deserializer::from_str(&raw[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| CoreError::AiResponseMalformed("empty JSON payload".into()))?
        .map_err(|e| CoreError::AiResponseMalformed(format!("invalid JSON: {}", e)))?;

    serde_json::from_value(value)
        .map_err(|e| CoreError::AiResponseMalformed(format!("unexpected shape: {}", e)))
}

/// Rejects quizzes that could not be scored: no questions, or an answer key
/// pointing outside the option list.
pub fn validate_quiz(quiz: &GeneratedQuiz) -> Result<(), CoreError> {
    if quiz.questions.is_empty() {
        return Err(CoreError::AiResponseMalformed("quiz has no questions".into()));
    }
    for (i, q) in quiz.questions.iter().enumerate() {
        if q.options.is_empty() || (q.correct_answer as usize) >= q.options.len() {
            return Err(CoreError::AiResponseMalformed(format!(
                "question {} has correctAnswer {} but {} options",
                i + 1,
                q.correct_answer,
                q.options.len()
            )));
        }
    }
    Ok(())
}
