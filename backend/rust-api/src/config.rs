use serde::Deserialize;
use std::env;

use crate::services::scoring::ProgressPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Rate limiting is off when unset
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub jwt_ttl_seconds: i64,
    pub bcrypt_cost: u32,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub ai_timeout_secs: u64,
    pub initial_credits: u32,
    pub progress_policy: ProgressPolicy,
    pub bind_addr: String,
    pub superuser_seed_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_backend: StorageBackend::Mongo,
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "cogni".to_string(),
            redis_uri: None,
            jwt_secret: "dev-secret-only-for-local-testing".to_string(),
            jwt_ttl_seconds: 7 * 24 * 3600,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            gemini_api_key: None,
            gemini_model: "gemini-1.5-flash".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            ai_timeout_secs: 60,
            initial_credits: 100,
            progress_policy: ProgressPolicy::Overwrite,
            bind_addr: "0.0.0.0:8081".to_string(),
            superuser_seed_file: None,
        }
    }
}

/// Reads `key` from the layered settings, then from the plain environment.
fn lookup(settings: &config::Config, key: &str, env_key: &str) -> Option<String> {
    settings
        .get_string(key)
        .ok()
        .or_else(|| env::var(env_key).ok())
        .filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &str,
    default: T,
) -> Result<T, config::ConfigError> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| config::ConfigError::Message(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(default),
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, local .env as fallback
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/{APP_ENV}.toml, overridden by APP__SECTION__KEY variables
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Self::from_sources(&settings, &app_env)
    }

    fn from_sources(settings: &config::Config, app_env: &str) -> Result<Self, config::ConfigError> {
        let defaults = Config::default();

        let storage_backend = match lookup(settings, "storage.backend", "STORAGE_BACKEND") {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "mongo" => StorageBackend::Mongo,
                "memory" => StorageBackend::Memory,
                other => {
                    return Err(config::ConfigError::Message(format!(
                        "STORAGE_BACKEND must be mongo or memory, got {}",
                        other
                    )))
                }
            },
            None => defaults.storage_backend,
        };

        let jwt_secret = match lookup(settings, "auth.jwt_secret", "JWT_SECRET") {
            Some(secret) => secret,
            None if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            None => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                defaults.jwt_secret
            }
        };

        let progress_policy = match lookup(settings, "quiz.progress_policy", "PROGRESS_POLICY") {
            Some(raw) => ProgressPolicy::parse(&raw).ok_or_else(|| {
                config::ConfigError::Message(format!(
                    "PROGRESS_POLICY must be overwrite or accumulate, got {}",
                    raw
                ))
            })?,
            None => defaults.progress_policy,
        };

        Ok(Config {
            storage_backend,
            mongo_uri: lookup(settings, "database.mongo_uri", "MONGO_URI")
                .unwrap_or(defaults.mongo_uri),
            mongo_database: lookup(settings, "database.mongo_database", "MONGO_DATABASE")
                .unwrap_or(defaults.mongo_database),
            redis_uri: lookup(settings, "redis.uri", "REDIS_URI"),
            jwt_secret,
            jwt_ttl_seconds: parse_or(
                lookup(settings, "auth.jwt_ttl_seconds", "JWT_TTL_SECONDS"),
                "JWT_TTL_SECONDS",
                defaults.jwt_ttl_seconds,
            )?,
            bcrypt_cost: parse_or(
                lookup(settings, "auth.bcrypt_cost", "BCRYPT_COST"),
                "BCRYPT_COST",
                defaults.bcrypt_cost,
            )?,
            gemini_api_key: lookup(settings, "ai.gemini_api_key", "GEMINI_API_KEY"),
            gemini_model: lookup(settings, "ai.gemini_model", "GEMINI_MODEL")
                .unwrap_or(defaults.gemini_model),
            gemini_base_url: lookup(settings, "ai.gemini_base_url", "GEMINI_BASE_URL")
                .unwrap_or(defaults.gemini_base_url),
            ai_timeout_secs: parse_or(
                lookup(settings, "ai.timeout_secs", "AI_TIMEOUT_SECS"),
                "AI_TIMEOUT_SECS",
                defaults.ai_timeout_secs,
            )?,
            initial_credits: parse_or(
                lookup(settings, "credits.initial", "INITIAL_CREDITS"),
                "INITIAL_CREDITS",
                defaults.initial_credits,
            )?,
            progress_policy,
            bind_addr: lookup(settings, "server.bind_addr", "BIND_ADDR")
                .unwrap_or(defaults.bind_addr),
            superuser_seed_file: lookup(settings, "auth.superuser_seed_file", "SUPERUSER_SEED_FILE"),
        })
    }
}
