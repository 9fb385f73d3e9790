//! Domain models for Scout

pub mod bandit;
pub mod config;
pub mod context;
pub mod trail;

pub use bandit::{
    ArmId, ArmLabel, ArmRef, BanditModel, ExploitationSnapshot, FitState, ModelCounters,
    Observation, PredictionRecord,
};
pub use config::{
    Config, ContextStorageSettings, FitSettings, LockSettings, LogFormat, LoggingConfig,
    ModelSettings, RotationPolicy, StoreBackend, StoreConfig, TrailSettings,
};
pub use context::{ContextSchema, RawContext};
pub use trail::Trail;
