use axum::{extract::State, response::Response, Extension};
use std::sync::Arc;
use validator::Validate;

use crate::{
    errors::ApiError,
    extractors::AppJson,
    handlers::ok,
    middlewares::auth::JwtClaims,
    models::conversation::ChatRequest,
    services::{mentor_service::MentorService, AppState},
};

/// POST /api/v1/mentor/chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<ChatRequest>,
) -> Result<Response, ApiError> {
    req.validate()?;

    let service = MentorService::new(state.storage.clone(), state.ai.clone());
    let reply = service.chat(&claims.sub, req).await?;
    Ok(ok("Message sent successfully", reply))
}
