use axum::{
    extract::{Path, Query, State},
    response::Response,
    Extension,
};
use std::sync::Arc;

use super::service;
use crate::{
    errors::ApiError,
    extractors::AppJson,
    handlers::ok,
    middlewares::auth::JwtClaims,
    models::user::{ListUsersQuery, UpdateCreditsRequest, UpdateRoleRequest},
    services::AppState,
};

/// GET /api/v1/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Response, ApiError> {
    let users = service(&state).list_users(query).await?;
    Ok(ok("Users retrieved successfully", users))
}

/// GET /api/v1/admin/users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let user = service(&state).get_user(&id).await?;
    Ok(ok("User retrieved successfully", user))
}

/// PUT /api/v1/admin/users/{id}/role
pub async fn update_user_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateRoleRequest>,
) -> Result<Response, ApiError> {
    let user = service(&state).set_role(&id, req.role).await?;
    Ok(ok("Role updated successfully", user))
}

/// PUT /api/v1/admin/users/{id}/credits
pub async fn update_user_credits(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateCreditsRequest>,
) -> Result<Response, ApiError> {
    let user = service(&state).set_credits(&id, req.credits).await?;
    Ok(ok("Credits updated successfully", user))
}

/// DELETE /api/v1/admin/users/{id}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    service(&state).delete_user(&claims.sub, &id).await?;
    Ok(ok("User deleted successfully", ()))
}
