use axum::{
    extract::{Path, Query, State},
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
    models::curriculum::{CreateCurriculumRequest, ListCurriculaQuery, UpdateCurriculumRequest},
    services::{curriculum_service::CurriculumService, AppState},
};

fn service(state: &AppState) -> CurriculumService {
    CurriculumService::new(state.storage.clone(), state.ai.clone())
}

/// POST /api/v1/curriculum/create
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateCurriculumRequest>,
) -> Result<Response, ApiError> {
    req.validate()?;

    let curriculum = service(&state).create(&claims.sub, req).await?;
    Ok(created("Curriculum created successfully", curriculum))
}

/// GET /api/v1/curriculum
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<ListCurriculaQuery>,
) -> Result<Response, ApiError> {
    let curricula = service(&state).list(&claims.sub, query).await?;
    Ok(ok("Curricula retrieved successfully", curricula))
}

/// GET /api/v1/curriculum/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let curriculum = service(&state).get(&claims.sub, &id).await?;
    Ok(ok("Curriculum retrieved successfully", curriculum))
}

/// PUT /api/v1/curriculum/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateCurriculumRequest>,
) -> Result<Response, ApiError> {
    req.validate()?;

    let curriculum = service(&state).update(&claims.sub, &id, req).await?;
    Ok(ok("Curriculum updated successfully", curriculum))
}

/// DELETE /api/v1/curriculum/{id}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    service(&state).delete(&claims.sub, &id).await?;
    Ok(ok("Curriculum deleted successfully", ()))
}
