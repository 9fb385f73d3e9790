//! In-memory adapters for tests and single-process runs.

pub mod shared_store;

pub use shared_store::InMemorySharedStore;
