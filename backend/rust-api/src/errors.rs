use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::storage::StorageError;

/// Failures raised by the scoring engine, the credit ledger and the AI
/// adapter. All of them are terminal for the current request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoreError {
    #[error("Answer count doesn't match question count (expected {expected}, got {actual})")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Quiz has no questions")]
    EmptyQuiz,

    #[error("Insufficient credits. Need {cost} credits, have {balance}.")]
    InsufficientCredits { balance: u32, cost: u32 },

    #[error("Failed to parse AI response: {0}")]
    AiResponseMalformed(String),

    #[error("AI request timed out after {0}s")]
    UpstreamTimeout(u64),

    #[error("AI service error: {0}")]
    Upstream(String),

    #[error("Gemini API key not provided")]
    MissingApiKey,
}

/// Error returned by handlers and services; renders the failure envelope
/// `{"success": false, "message": ..., "errors": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest {
        message: String,
        errors: Option<serde_json::Value>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            errors: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) | ApiError::Storage(StorageError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Core(core) => match core {
                CoreError::LengthMismatch { .. }
                | CoreError::EmptyQuiz
                | CoreError::InsufficientCredits { .. } => StatusCode::BAD_REQUEST,
                CoreError::AiResponseMalformed(_) | CoreError::Upstream(_) => {
                    StatusCode::BAD_GATEWAY
                }
                CoreError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                CoreError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Storage(StorageError::Duplicate(_)) => StatusCode::CONFLICT,
            ApiError::Storage(StorageError::Backend(_)) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let errors = serde_json::to_value(err.field_errors()).unwrap_or(serde_json::Value::Null);
        ApiError::BadRequest {
            message: "Validation failed".to_string(),
            errors: Some(errors),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, errors) = match self {
            ApiError::BadRequest { message, errors } => (message, errors),
            ApiError::Storage(StorageError::Backend(err)) => {
                tracing::error!("Storage failure: {:#}", err);
                ("Internal server error".to_string(), None)
            }
            ApiError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                ("Internal server error".to_string(), None)
            }
            other => (other.to_string(), None),
        };

        let body = json!({
            "success": false,
            "message": message,
            "errors": errors,
        });
        (status, Json(body)).into_response()
    }
}
