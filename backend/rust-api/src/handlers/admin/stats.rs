use axum::{extract::State, response::Response};
use std::sync::Arc;

use super::service;
use crate::{errors::ApiError, handlers::ok, services::AppState};

/// GET /api/v1/admin/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let stats = service(&state).stats().await?;
    Ok(ok("Statistics retrieved successfully", stats))
}
