//! Domain layer for the Scout model state manager
//!
//! This module contains the model state, its invariants and the ports
//! through which the services reach the shared store and the decision policy.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
