use axum::{extract::State, response::Response};
use std::sync::Arc;
use validator::Validate;

use crate::{
    errors::ApiError,
    extractors::AppJson,
    handlers::{created, ok},
    models::user::{LoginRequest, RegisterRequest},
    services::{auth_service::AuthService, AppState},
};

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<Response, ApiError> {
    req.validate()?;

    let service = AuthService::new(state.storage.clone(), &state.config);
    let registered = service.register(req).await?;
    Ok(created("User registered successfully", registered))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Response, ApiError> {
    req.validate()?;

    let service = AuthService::new(state.storage.clone(), &state.config);
    let session = service.login(req).await?;
    Ok(ok("Login successful", session))
}
