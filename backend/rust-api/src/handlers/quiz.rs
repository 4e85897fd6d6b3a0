use axum::{
    extract::{Path, State},
    response::Response,
    Extension,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    errors::ApiError,
    extractors::AppJson,
    handlers::{created, ok},
    middlewares::auth::JwtClaims,
    models::quiz::SubmitQuizRequest,
    services::{quiz_service::QuizService, AppState},
};

fn service(state: &AppState) -> QuizService {
    QuizService::new(
        state.storage.clone(),
        state.ai.clone(),
        state.config.progress_policy,
    )
}

/// POST /api/v1/curriculum/{id}/quiz/generate
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(curriculum_id): Path<String>,
) -> Result<Response, ApiError> {
    let quiz = service(&state).generate(&claims.sub, &curriculum_id).await?;
    Ok(created("Quiz generated successfully", quiz))
}

/// GET /api/v1/curriculum/{id}/quiz
pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(curriculum_id): Path<String>,
) -> Result<Response, ApiError> {
    let quiz = service(&state).get(&claims.sub, &curriculum_id).await?;
    Ok(ok("Quiz retrieved successfully", quiz))
}

/// POST /api/v1/curriculum/{id}/quiz/submit
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(curriculum_id): Path<String>,
    AppJson(req): AppJson<SubmitQuizRequest>,
) -> Result<Response, ApiError> {
    req.validate()?;

    let outcome = service(&state)
        .submit(&claims.sub, &curriculum_id, req)
        .await?;
    Ok(ok("Quiz submitted successfully", outcome))
}
