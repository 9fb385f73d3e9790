//! Application services: model persistence, locking, encoding and the
//! operations exposed to callers.

pub mod analytics;
pub mod bandit_service;
pub mod context_encoder;
pub mod context_stash;
pub mod distributed_lock;
pub mod fit_controller;
pub mod keys;
pub mod model_store;
pub mod settings;
pub mod trail_aggregator;

pub use analytics::{FeatureBreakdown, ModelDetails};
pub use bandit_service::{
    BanditService, HealthReport, ModelSummary, RecommendRequest, Recommendation, UpdateRecord,
    UpdateSummary,
};
pub use context_encoder::ContextEncoder;
pub use context_stash::ContextStash;
pub use distributed_lock::{DistributedLock, LockToken};
pub use fit_controller::{FitController, FitOutcome, RecommendationSource};
pub use keys::KeySpace;
pub use model_store::VersionedModelStore;
pub use settings::SettingsHandle;
pub use trail_aggregator::TrailAggregator;
