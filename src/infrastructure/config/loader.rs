use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::{Config, ModelSettings};

/// Configuration error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid lock retry_count: {0}. Must be at least 1")]
    InvalidLockRetryCount(u32),

    #[error("Invalid lock expiry_ms: {0}. Must be positive")]
    InvalidLockExpiry(u64),

    #[error(
        "Invalid lock configuration: expiry_ms ({expiry_ms}) must exceed the total retry time ({retry_total_ms} ms)"
    )]
    LockExpiryTooShort { expiry_ms: u64, retry_total_ms: u64 },

    #[error("Invalid trail window_minutes: {0}. Must be positive")]
    InvalidTrailWindow(u32),

    #[error("Invalid trail bucket_granularity_seconds: {0}. Must be positive and fit inside the window")]
    InvalidTrailGranularity(u32),

    #[error("Invalid min_observations: {0}. Must be at least 1")]
    InvalidMinObservations(usize),

    #[error("Invalid exploitation_snapshot_interval: {0}. Must be at least 1")]
    InvalidSnapshotInterval(u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .scout/config.yaml (project config)
    /// 3. .scout/local.yaml (project local overrides, optional)
    /// 4. Environment variables (SCOUT_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".scout/config.yaml"))
            .merge(Yaml::file(".scout/local.yaml"))
            .merge(Env::prefixed("SCOUT_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring env overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("SCOUT_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.store.database_path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.store.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.store.max_connections));
        }

        if config.store.key_prefix.contains(char::is_whitespace) {
            return Err(ConfigError::ValidationFailed(
                "store key_prefix cannot contain whitespace".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Self::validate_model_settings(&config.models)
    }

    /// Validate the hot-reloadable model settings
    pub fn validate_model_settings(settings: &ModelSettings) -> Result<(), ConfigError> {
        let lock = &settings.lock;
        if lock.retry_count == 0 {
            return Err(ConfigError::InvalidLockRetryCount(lock.retry_count));
        }

        if lock.expiry_ms == 0 {
            return Err(ConfigError::InvalidLockExpiry(lock.expiry_ms));
        }

        let retry_total_ms = u64::from(lock.retry_count).saturating_mul(lock.retry_delay_ms);
        if lock.expiry_ms <= retry_total_ms {
            return Err(ConfigError::LockExpiryTooShort {
                expiry_ms: lock.expiry_ms,
                retry_total_ms,
            });
        }

        let trail = &settings.trail;
        if trail.window_minutes == 0 {
            return Err(ConfigError::InvalidTrailWindow(trail.window_minutes));
        }

        if trail.bucket_granularity_seconds == 0
            || u64::from(trail.bucket_granularity_seconds) > u64::from(trail.window_minutes) * 60
        {
            return Err(ConfigError::InvalidTrailGranularity(trail.bucket_granularity_seconds));
        }

        if settings.fit.min_observations == 0 {
            return Err(ConfigError::InvalidMinObservations(settings.fit.min_observations));
        }

        if settings.fit.exploitation_snapshot_interval == 0 {
            return Err(ConfigError::InvalidSnapshotInterval(
                settings.fit.exploitation_snapshot_interval,
            ));
        }

        if settings.context_storage.enabled && settings.context_storage.ttl_seconds == 0 {
            return Err(ConfigError::ValidationFailed(
                "context_storage ttl_seconds must be positive when storage is enabled".to_string(),
            ));
        }

        Ok(())
    }
}
