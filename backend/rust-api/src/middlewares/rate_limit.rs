use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::errors::ApiError;
use crate::services::AppState;

// Auth-specific rate limits
const LOGIN_RATE_LIMIT: u32 = 10; // 10 attempts per 5 minutes
const LOGIN_RATE_WINDOW_SECONDS: u64 = 300;
const REGISTER_RATE_LIMIT: u32 = 5; // 5 registrations per hour
const REGISTER_RATE_WINDOW_SECONDS: u64 = 3600;

// AI generation (curriculum, quiz, mentor) per user
const GENERATION_RATE_LIMIT: u32 = 20; // 20 calls per 10 minutes
const GENERATION_RATE_WINDOW_SECONDS: u64 = 600;

const RATE_LIMIT_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])

    local current = redis.call('GET', key)

    if current == false then
        redis.call('SET', key, 1, 'EX', window)
        return 1
    end

    current = tonumber(current)

    if current >= limit then
        return 0
    end

    redis.call('INCR', key)
    return 1
"#;

fn extract_client_ip_from(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    // Preferred order: X-Forwarded-For, Forwarded, X-Real-IP, ConnectInfo
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("forwarded") {
        if let Ok(s) = v.to_str() {
            for part in s.split(';') {
                if let Some(val) = part.trim().strip_prefix("for=") {
                    return val.trim().trim_matches('"').to_string();
                }
            }
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

fn limit_from_env(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(default)
}

/// Redis connection to limit against, or `None` when limiting is off
/// (no Redis configured, or RATE_LIMIT_DISABLED=1).
fn limiter(state: &AppState) -> Option<&ConnectionManager> {
    if std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1" {
        tracing::debug!("Rate limiting disabled via RATE_LIMIT_DISABLED=1");
        return None;
    }
    state.redis.as_ref()
}

/// Fixed-window counter, atomic through a Lua script
async fn check_rate_limit(
    redis: &ConnectionManager,
    key: &str,
    limit: u32,
    window_seconds: u64,
) -> anyhow::Result<bool> {
    let mut conn = redis.clone();

    let allowed: u32 = redis::Script::new(RATE_LIMIT_SCRIPT)
        .key(key)
        .arg(limit)
        .arg(window_seconds)
        .invoke_async(&mut conn)
        .await?;

    Ok(allowed == 1)
}

async fn enforce(
    redis: &ConnectionManager,
    key: String,
    limit: u32,
    window_seconds: u64,
) -> Result<(), ApiError> {
    let allowed = check_rate_limit(redis, &key, limit, window_seconds)
        .await
        .map_err(|e| {
            tracing::error!("Rate limit check failed: {}", e);
            ApiError::Internal("Rate limit check failed".to_string())
        })?;

    if !allowed {
        tracing::warn!("Rate limit exceeded: {}", key);
        return Err(ApiError::TooManyRequests(
            "Too many requests, please try again later".to_string(),
        ));
    }
    Ok(())
}

/// Login: 10 attempts per 5 minutes per IP
pub async fn login_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(redis) = limiter(&state) {
        let client_ip = extract_client_ip_from(request.headers(), request.extensions());
        enforce(
            redis,
            format!("ratelimit:login:{}", client_ip),
            limit_from_env("RATE_LIMIT_LOGIN_ATTEMPTS", LOGIN_RATE_LIMIT),
            LOGIN_RATE_WINDOW_SECONDS,
        )
        .await?;
    }

    Ok(next.run(request).await)
}

/// Register: 5 registrations per hour per IP
pub async fn register_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(redis) = limiter(&state) {
        let client_ip = extract_client_ip_from(request.headers(), request.extensions());
        enforce(
            redis,
            format!("ratelimit:register:{}", client_ip),
            limit_from_env("RATE_LIMIT_REGISTER_ATTEMPTS", REGISTER_RATE_LIMIT),
            REGISTER_RATE_WINDOW_SECONDS,
        )
        .await?;
    }

    Ok(next.run(request).await)
}

/// AI-backed routes, keyed by the authenticated user (IP as fallback).
/// Must run after `auth_middleware`.
pub async fn generation_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(redis) = limiter(&state) {
        let subject = request
            .extensions()
            .get::<super::auth::JwtClaims>()
            .map(|claims| format!("user:{}", claims.sub))
            .unwrap_or_else(|| {
                format!(
                    "ip:{}",
                    extract_client_ip_from(request.headers(), request.extensions())
                )
            });
        enforce(
            redis,
            format!("ratelimit:generation:{}", subject),
            limit_from_env("RATE_LIMIT_GENERATION", GENERATION_RATE_LIMIT),
            GENERATION_RATE_WINDOW_SECONDS,
        )
        .await?;
    }

    Ok(next.run(request).await)
}
