//! Infrastructure layer module
//!
//! - Configuration management (figment: defaults, YAML files, environment)
//! - Logging infrastructure (tracing-subscriber, tracing-appender)

pub mod config;
pub mod logging;
