//! Shared store port.
//!
//! The key/value store every Scout process shares. Keys are flat strings;
//! values are byte blobs or integer counters. Expiring keys behave as absent
//! once their time-to-live has passed.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::errors::DomainResult;

/// Key/value operations over the shared store.
///
/// Implementations must make `set_if_absent`, `delete_if_equals` and
/// `commit_versioned` atomic with respect to every other process using the
/// same store.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Read a blob value.
    async fn get(&self, key: &str) -> DomainResult<Option<Vec<u8>>>;

    /// Write a blob value, replacing any previous one.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> DomainResult<()>;

    /// Write a blob only if the key is absent (or expired).
    ///
    /// Returns `true` if the value was written.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> DomainResult<bool>;

    /// Delete the key only if its current value equals `expected`.
    ///
    /// Returns `true` if a key was deleted.
    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> DomainResult<bool>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[&str]) -> DomainResult<u64>;

    /// Read an integer counter.
    async fn get_counter(&self, key: &str) -> DomainResult<Option<u64>>;

    /// Increment `counter_key` and write `value` under `key` as one unit.
    ///
    /// Either both happen or neither does. Returns the new counter value.
    async fn commit_versioned(&self, counter_key: &str, key: &str, value: &[u8]) -> DomainResult<u64>;

    /// Live keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> DomainResult<Vec<String>>;

    /// Check that the store is reachable.
    async fn ping(&self) -> DomainResult<()>;
}
