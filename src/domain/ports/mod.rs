//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces adapters must implement:
//! - SharedStore: key/value operations over the store shared by all processes
//! - DecisionPolicy: the pluggable arm-selection capability
//!
//! These traits keep the model state manager independent of any specific
//! store or bandit algorithm.

pub mod decision_policy;
pub mod shared_store;

pub use decision_policy::{uniform_arm, DecisionPolicy, TrainingBatch};
pub use shared_store::SharedStore;
