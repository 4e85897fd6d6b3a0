use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use std::sync::Arc;

use super::service;
use crate::{
    errors::ApiError, handlers::ok, models::curriculum::AdminListCurriculaQuery,
    services::AppState,
};

/// GET /api/v1/admin/curriculum
pub async fn list_curricula(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListCurriculaQuery>,
) -> Result<Response, ApiError> {
    let curricula = service(&state).list_curricula(query).await?;
    Ok(ok("Curricula retrieved successfully", curricula))
}

/// GET /api/v1/admin/curriculum/{id}
pub async fn get_curriculum(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let curriculum = service(&state).get_curriculum(&id).await?;
    Ok(ok("Curriculum retrieved successfully", curriculum))
}

/// DELETE /api/v1/admin/curriculum/{id}
pub async fn delete_curriculum(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    service(&state).delete_curriculum(&id).await?;
    Ok(ok("Curriculum deleted successfully", ()))
}
