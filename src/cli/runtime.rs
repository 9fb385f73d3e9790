//! Wiring from configuration to a ready service.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use crate::adapters::memory::InMemorySharedStore;
use crate::adapters::policies::PolicyKind;
use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig, SqliteSharedStore};
use crate::domain::models::{Config, StoreBackend, StoreConfig};
use crate::domain::ports::SharedStore;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{BanditService, KeySpace, SettingsHandle};

/// Load configuration from `path`, or from the default locations.
pub fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Open the configured shared store.
///
/// The SQLite store is migrated and cleared of expired keys on open.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn SharedStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemorySharedStore::new())),
        StoreBackend::Sqlite => {
            let url = database_url(&config.database_path);
            let pool = initialize_database(&url, PoolConfig::from(config))
                .await
                .with_context(|| format!("Failed to open store at {}", config.database_path))?;

            let store = SqliteSharedStore::new(pool);
            let purged = store.purge_expired().await.context("Failed to purge expired keys")?;
            debug!(purged, "purged expired keys");
            Ok(Arc::new(store))
        }
    }
}

pub async fn build_service(config: &Config) -> Result<BanditService<PolicyKind>> {
    let store = open_store(&config.store).await?;
    Ok(BanditService::new(
        store,
        KeySpace::new(config.store.key_prefix.clone()),
        SettingsHandle::new(config.models.clone()),
    ))
}
