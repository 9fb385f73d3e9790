//! Adapters implementing the domain ports.

pub mod memory;
pub mod policies;
pub mod sqlite;
