use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::config::{Config, StorageBackend};
use crate::services::ai_client::{AiGenerator, GeminiClient};
use crate::storage::{InMemoryStorage, MongoStorage, Storage};

pub mod admin_service;
pub mod ai_adapter;
pub mod ai_client;
pub mod auth_service;
pub mod credit_ledger;
pub mod curriculum_service;
pub mod mentor_service;
pub mod prompts;
pub mod quiz_service;
pub mod scoring;
pub mod superuser_seed;

pub struct AppState {
    pub config: Config,
    pub storage: Arc<dyn Storage>,
    pub ai: Arc<dyn AiGenerator>,
    /// Rate limiting backend; absent when REDIS_URI is unset
    pub redis: Option<ConnectionManager>,
}

impl AppState {
    /// Connects the configured storage backend, the Gemini client and,
    /// when configured, Redis.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let storage: Arc<dyn Storage> = match config.storage_backend {
            StorageBackend::Mongo => {
                let client = mongodb::Client::with_uri_str(&config.mongo_uri).await?;
                let mongo = MongoStorage::new(client.database(&config.mongo_database));
                mongo.ensure_indexes().await?;
                tracing::info!("MongoDB connected");
                Arc::new(mongo)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Arc::new(InMemoryStorage::new())
            }
        };

        let redis = match &config.redis_uri {
            Some(uri) => Some(connect_redis(uri).await?),
            None => {
                tracing::warn!("REDIS_URI not set, rate limiting disabled");
                None
            }
        };

        let ai: Arc<dyn AiGenerator> = Arc::new(GeminiClient::from_config(&config));

        Ok(Self::with_components(config, storage, ai, redis))
    }

    pub fn with_components(
        config: Config,
        storage: Arc<dyn Storage>,
        ai: Arc<dyn AiGenerator>,
        redis: Option<ConnectionManager>,
    ) -> Self {
        Self {
            config,
            storage,
            ai,
            redis,
        }
    }
}

async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");

    let client = redis::Client::open(uri)?;
    let redis = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ConnectionManager::new(client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}
