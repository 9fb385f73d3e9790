use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for Scout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Shared store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Model state settings (hot-reloadable)
    #[serde(default)]
    pub models: ModelSettings,
}

/// Which shared store backs the model state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

/// Shared store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Prefix namespacing every key this process writes
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

const fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_database_path() -> String {
    ".scout/scout.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

fn default_key_prefix() -> String {
    "scout:".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_path: default_database_path(),
            max_connections: default_max_connections(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Log file rotation policy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Directory for log files (if None logs only to stdout)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Enable stdout logging
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// Log rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
        }
    }
}

/// Settings read at request time by the model services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelSettings {
    #[serde(default)]
    pub lock: LockSettings,

    /// Serve loads from the local cache when its version is current
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    #[serde(default)]
    pub trail: TrailSettings,

    #[serde(default)]
    pub fit: FitSettings,

    #[serde(default)]
    pub context_storage: ContextStorageSettings,

    /// Maximum number of raw-context prediction records kept per model
    #[serde(default = "default_feature_trail_capacity")]
    pub feature_trail_capacity: usize,
}

const fn default_feature_trail_capacity() -> usize {
    1000
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            lock: LockSettings::default(),
            cache_enabled: true,
            trail: TrailSettings::default(),
            fit: FitSettings::default(),
            context_storage: ContextStorageSettings::default(),
            feature_trail_capacity: default_feature_trail_capacity(),
        }
    }
}

/// Distributed lock settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LockSettings {
    /// Acquisition attempts before giving up
    #[serde(default = "default_lock_retry_count")]
    pub retry_count: u32,

    /// Delay between attempts in milliseconds
    #[serde(default = "default_lock_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Lock time-to-live in milliseconds
    #[serde(default = "default_lock_expiry_ms")]
    pub expiry_ms: u64,
}

const fn default_lock_retry_count() -> u32 {
    5
}

const fn default_lock_retry_delay_ms() -> u64 {
    200
}

const fn default_lock_expiry_ms() -> u64 {
    30_000
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            retry_count: default_lock_retry_count(),
            retry_delay_ms: default_lock_retry_delay_ms(),
            expiry_ms: default_lock_expiry_ms(),
        }
    }
}

/// Trail bucketing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TrailSettings {
    /// Retention window in minutes
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,

    /// Bucket width in seconds
    #[serde(default = "default_bucket_granularity_seconds")]
    pub bucket_granularity_seconds: u32,
}

const fn default_window_minutes() -> u32 {
    60
}

const fn default_bucket_granularity_seconds() -> u32 {
    60
}

impl Default for TrailSettings {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            bucket_granularity_seconds: default_bucket_granularity_seconds(),
        }
    }
}

/// Cold-to-trained transition settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FitSettings {
    /// Buffered observations required for the first batch fit
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,

    /// Take an exploitation snapshot every N predictions
    #[serde(default = "default_snapshot_interval")]
    pub exploitation_snapshot_interval: u64,
}

const fn default_min_observations() -> usize {
    10
}

const fn default_snapshot_interval() -> u64 {
    10
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            min_observations: default_min_observations(),
            exploitation_snapshot_interval: default_snapshot_interval(),
        }
    }
}

/// Request-context stash settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContextStorageSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Time-to-live of a stashed context in seconds
    #[serde(default = "default_context_ttl_seconds")]
    pub ttl_seconds: u64,
}

const fn default_context_ttl_seconds() -> u64 {
    86_400
}

impl Default for ContextStorageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_context_ttl_seconds(),
        }
    }
}
