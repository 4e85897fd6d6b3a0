use std::sync::Arc;

use anyhow::Context;
use bcrypt::{hash, verify};
use chrono::Utc;

use crate::config::Config;
use crate::errors::ApiError;
use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::user::{
    LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, UpdateProfileRequest, User,
    UserRole, UserSummary,
};
use crate::storage::{new_id, Storage, StorageError};

/// Registration, login and self-service profile operations
pub struct AuthService {
    storage: Arc<dyn Storage>,
    jwt_service: JwtService,
    jwt_ttl_seconds: i64,
    bcrypt_cost: u32,
    initial_credits: u32,
}

impl AuthService {
    pub fn new(storage: Arc<dyn Storage>, config: &Config) -> Self {
        Self {
            storage,
            jwt_service: JwtService::new(&config.jwt_secret),
            jwt_ttl_seconds: config.jwt_ttl_seconds,
            bcrypt_cost: config.bcrypt_cost,
            initial_credits: config.initial_credits,
        }
    }

    pub fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        hash(password, self.bcrypt_cost).context("Failed to hash password")
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> anyhow::Result<bool> {
        verify(password, hash).context("Failed to verify password")
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, ApiError> {
        if self.storage.find_user_by_email(&req.email).await?.is_some() {
            return Err(ApiError::bad_request("User already exists"));
        }

        let now = Utc::now();
        let user = User {
            id: new_id(),
            email: req.email,
            password_hash: self.hash_password(&req.password)?,
            name: req.display_name,
            role: UserRole::User,
            credits: self.initial_credits,
            learning_style: None,
            gemini_api_key: None,
            created_at: now,
            updated_at: now,
        };

        let user = match self.storage.insert_user(user).await {
            Ok(user) => user,
            // Concurrent registration with the same email
            Err(StorageError::Duplicate(_)) => {
                return Err(ApiError::bad_request("User already exists"))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = %user.id, "User registered");
        Ok(RegisterResponse { user_id: user.id })
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, ApiError> {
        let user = self.storage.find_user_by_email(&req.email).await?;

        let user = match user {
            Some(user) if self.verify_password(&req.password, &user.password_hash)? => user,
            _ => {
                tracing::warn!(email = %req.email, "Failed login attempt");
                return Err(ApiError::unauthorized("Invalid credentials"));
            }
        };

        let claims = JwtClaims::for_user(&user, self.jwt_ttl_seconds);
        let token = self
            .jwt_service
            .generate_token(&claims)
            .map_err(|e| ApiError::Internal(format!("Failed to issue token: {}", e)))?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginResponse {
            token,
            user: UserSummary::from(&user),
        })
    }

    pub async fn current_user(&self, user_id: &str) -> Result<User, ApiError> {
        self.storage
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        req: UpdateProfileRequest,
    ) -> Result<User, ApiError> {
        let key = req
            .gemini_api_key
            .map(|key| key.filter(|k| !k.trim().is_empty()));

        self.storage
            .update_user_profile(user_id, req.name, key)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))
    }
}
