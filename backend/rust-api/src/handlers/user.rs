use axum::{extract::State, response::Response, Extension};
use std::sync::Arc;
use validator::Validate;

use crate::{
    errors::ApiError,
    extractors::AppJson,
    handlers::ok,
    middlewares::auth::JwtClaims,
    models::user::{CreditsResponse, UpdateProfileRequest, UpdatedProfile, UserProfile},
    services::{auth_service::AuthService, AppState},
};

/// GET /api/v1/user/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Response, ApiError> {
    let service = AuthService::new(state.storage.clone(), &state.config);
    let user = service.current_user(&claims.sub).await?;
    Ok(ok("Profile retrieved successfully", UserProfile::from(user)))
}

/// PUT /api/v1/user/update
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> Result<Response, ApiError> {
    req.validate()?;

    let service = AuthService::new(state.storage.clone(), &state.config);
    let user = service.update_profile(&claims.sub, req).await?;
    tracing::info!(user_id = %claims.sub, "Profile updated");
    Ok(ok("Profile updated successfully", UpdatedProfile::from(user)))
}

/// GET /api/v1/user/credits
pub async fn credits(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Response, ApiError> {
    let service = AuthService::new(state.storage.clone(), &state.config);
    let user = service.current_user(&claims.sub).await?;
    Ok(ok(
        "Credits retrieved successfully",
        CreditsResponse {
            credits: user.credits,
        },
    ))
}
