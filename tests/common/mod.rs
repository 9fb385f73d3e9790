//! Common test utilities for integration tests
//!
//! Provides a call-recording decision policy, a store wrapper that can be
//! told to fail, and service builders shared by the integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use scout::adapters::memory::InMemorySharedStore;
use scout::domain::models::{ArmId, ArmLabel, ModelSettings, RawContext};
use scout::{
    BanditService, DecisionPolicy, DomainError, DomainResult, KeySpace, SettingsHandle, SharedStore,
    TrainingBatch,
};

/// Policy that records the size of every fit call and always prefers
/// `favourite`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingPolicy {
    pub fit_batches: Vec<usize>,
    pub partial_batches: Vec<usize>,
    pub favourite: ArmId,
}

impl DecisionPolicy for RecordingPolicy {
    fn fit(&mut self, _arms: &[ArmId], batch: &TrainingBatch) -> DomainResult<()> {
        self.fit_batches.push(batch.len());
        Ok(())
    }

    fn partial_fit(&mut self, _arms: &[ArmId], batch: &TrainingBatch) -> DomainResult<()> {
        self.partial_batches.push(batch.len());
        Ok(())
    }

    fn choose(&self, _arms: &[ArmId], _context: &[f64]) -> DomainResult<ArmId> {
        Ok(self.favourite)
    }

    fn expected_rewards(&self, arms: &[ArmId], _context: &[f64]) -> DomainResult<BTreeMap<ArmId, f64>> {
        Ok(arms
            .iter()
            .map(|arm| (*arm, if *arm == self.favourite { 1.0 } else { 0.0 }))
            .collect())
    }
}

/// Shared store that fails versioned commits (or everything) on demand.
pub struct FailingStore {
    inner: InMemorySharedStore,
    fail_commits: AtomicBool,
    fail_all: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemorySharedStore::new(),
            fail_commits: AtomicBool::new(false),
            fail_all: AtomicBool::new(false),
        }
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> DomainResult<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(DomainError::Persistence("store unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedStore for FailingStore {
    async fn get(&self, key: &str) -> DomainResult<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> DomainResult<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> DomainResult<bool> {
        self.check()?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> DomainResult<bool> {
        self.check()?;
        self.inner.delete_if_equals(key, expected).await
    }

    async fn delete(&self, keys: &[&str]) -> DomainResult<u64> {
        self.check()?;
        self.inner.delete(keys).await
    }

    async fn get_counter(&self, key: &str) -> DomainResult<Option<u64>> {
        self.check()?;
        self.inner.get_counter(key).await
    }

    async fn commit_versioned(&self, counter_key: &str, key: &str, value: &[u8]) -> DomainResult<u64> {
        self.check()?;
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(DomainError::Persistence("write rejected".to_string()));
        }
        self.inner.commit_versioned(counter_key, key, value).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> DomainResult<Vec<String>> {
        self.check()?;
        self.inner.keys_with_prefix(prefix).await
    }

    async fn ping(&self) -> DomainResult<()> {
        self.check()
    }
}

/// Settings with a fast-retrying lock and the given batch-fit threshold.
pub fn settings(min_observations: usize) -> ModelSettings {
    let mut settings = ModelSettings::default();
    settings.fit.min_observations = min_observations;
    settings.fit.exploitation_snapshot_interval = 1;
    settings.lock.retry_count = 400;
    settings.lock.retry_delay_ms = 5;
    settings
}

pub fn service_on<P: DecisionPolicy>(store: Arc<dyn SharedStore>, settings: ModelSettings) -> BanditService<P> {
    BanditService::new(store, KeySpace::default(), SettingsHandle::new(settings))
}

pub fn memory_service(min_observations: usize) -> BanditService<RecordingPolicy> {
    service_on(Arc::new(InMemorySharedStore::new()), settings(min_observations))
}

/// Arms 0 -> "a" and 1 -> "b".
pub fn two_arms() -> BTreeMap<ArmId, ArmLabel> {
    BTreeMap::from([(0, ArmLabel::from("a")), (1, ArmLabel::from("b"))])
}

pub fn context(value: serde_json::Value) -> RawContext {
    serde_json::from_value(value).expect("context must be a JSON object")
}

/// Path to a SQLite database file in a fresh temporary directory.
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("scout.db");
    (dir, db_path)
}
