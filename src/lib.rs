//! Scout - bandit model state manager
//!
//! Scout keeps the state of online-learning recommendation models in a key
//! value store shared by every serving process. Each model is a versioned
//! blob guarded by a per-model distributed lock, cached locally and
//! invalidated by comparing versions.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Model state, errors and ports
//! - **Adapters** (`adapters`): Shared stores and decision policies
//! - **Service Layer** (`services`): Locking, persistence, encoding and the model operations
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use scout::adapters::memory::InMemorySharedStore;
//! use scout::adapters::policies::PolicyKind;
//! use scout::services::{BanditService, KeySpace, SettingsHandle};
//!
//! let service: BanditService<PolicyKind> = BanditService::new(
//!     Arc::new(InMemorySharedStore::new()),
//!     KeySpace::default(),
//!     SettingsHandle::default(),
//! );
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::policies::PolicyKind;
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{ArmId, ArmLabel, ArmRef, BanditModel, Config, ModelSettings, RawContext};
pub use domain::ports::{DecisionPolicy, SharedStore, TrainingBatch};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{BanditService, KeySpace, SettingsHandle};
