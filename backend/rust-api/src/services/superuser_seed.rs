use anyhow::{Context, Result};
use bcrypt::hash;
use chrono::Utc;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

use crate::config::Config;
use crate::models::user::{User, UserRole};
use crate::storage::{new_id, Storage, StorageError};

#[derive(Debug, Deserialize)]
pub struct SuperuserSeed {
    pub email: String,
    #[serde(default = "default_superuser_name")]
    pub name: String,
    /// Plain-text password from seed file (hashed before storage)
    pub password: String,
}

fn default_superuser_name() -> String {
    "Super Admin".to_string()
}

impl SuperuserSeed {
    fn into_user(self, config: &Config) -> Result<User> {
        let password_hash =
            hash(&self.password, config.bcrypt_cost).context("Failed to hash superuser password")?;
        let now = Utc::now();
        Ok(User {
            id: new_id(),
            email: self.email,
            password_hash,
            name: self.name,
            role: UserRole::Admin,
            credits: config.initial_credits,
            learning_style: None,
            gemini_api_key: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Inserts the admin described by the seed file unless its email is taken.
/// Returns whether a user was created.
pub async fn bootstrap(config: &Config, storage: &dyn Storage) -> Result<bool> {
    let path = match &config.superuser_seed_file {
        Some(path) if !path.is_empty() => Path::new(path),
        _ => {
            tracing::debug!("No superuser seed file configured, skipping bootstrap");
            return Ok(false);
        }
    };

    if !path.exists() {
        tracing::warn!(
            "Superuser seed file {} not found, skipping bootstrap",
            path.display()
        );
        return Ok(false);
    }

    let contents = fs::read_to_string(path)
        .await
        .context("Failed to read superuser seed file")?;
    let seed: SuperuserSeed =
        serde_json::from_str(&contents).context("Failed to deserialize superuser seed payload")?;

    let email = seed.email.clone();
    if storage
        .find_user_by_email(&email)
        .await
        .context("Failed to look up superuser")?
        .is_some()
    {
        tracing::info!("Superuser {} already exists, seed skipped", email);
        return Ok(false);
    }

    tracing::info!("Bootstrapping superuser with email {}", email);
    match storage.insert_user(seed.into_user(config)?).await {
        Ok(_) => {
            tracing::info!("Superuser inserted; remove seed file to prevent rerun");
            Ok(true)
        }
        // Lost a race with another instance doing the same
        Err(StorageError::Duplicate(_)) => Ok(false),
        Err(e) => Err(anyhow::Error::new(e).context("Failed to insert superuser")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    fn seed_file(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("cogni-seed-{}.json", new_id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn config_with(path: &Path) -> Config {
        Config {
            superuser_seed_file: Some(path.display().to_string()),
            bcrypt_cost: 4,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn seeds_admin_once() {
        let path = seed_file(r#"{"email":"root@example.com","password":"s3cret"}"#);
        let config = config_with(&path);
        let storage = InMemoryStorage::new();

        assert!(bootstrap(&config, &storage).await.unwrap());
        assert!(!bootstrap(&config, &storage).await.unwrap());

        let admin = storage
            .find_user_by_email("root@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert_eq!(admin.name, "Super Admin");
        assert!(bcrypt::verify("s3cret", &admin.password_hash).unwrap());

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn missing_file_is_skipped() {
        let config = config_with(Path::new("/nonexistent/cogni-seed.json"));
        let storage = InMemoryStorage::new();
        assert!(!bootstrap(&config, &storage).await.unwrap());
    }
}
