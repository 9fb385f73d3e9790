//! In-process implementation of the SharedStore port.
//!
//! A single mutex guards the whole keyspace, so every operation is atomic.
//! Only processes sharing the same `Arc` see each other's writes; use the
//! SQLite adapter when several processes must coordinate.
//!
//! Expired entries read as absent immediately and are swept from memory by
//! the next write once the sweep interval has passed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::SharedStore;

#[derive(Debug, Clone)]
enum StoredValue {
    Blob(Vec<u8>),
    Counter(u64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct InMemorySharedStore {
    entries: Mutex<HashMap<String, Entry>>,
    epoch: Instant,
    sweep_interval: Duration,
    /// Milliseconds after `epoch` at which the next write sweeps
    next_sweep_ms: AtomicU64,
}

impl Default for InMemorySharedStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl InMemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            epoch: Instant::now(),
            next_sweep_ms: AtomicU64::new(millis(sweep_interval)),
            sweep_interval,
        }
    }

    /// Drop expired entries if the sweep interval has passed. Callers hold
    /// the entries lock.
    fn sweep_if_due(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        let elapsed = millis(now.duration_since(self.epoch));
        if elapsed < self.next_sweep_ms.load(Ordering::Relaxed) {
            return;
        }
        entries.retain(|_, entry| entry.is_live(now));
        self.next_sweep_ms
            .store(elapsed.saturating_add(millis(self.sweep_interval)), Ordering::Relaxed);
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn live<'a>(entries: &'a HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a Entry> {
    entries.get(key).filter(|entry| entry.is_live(now))
}

fn counter_value(key: &str, entry: Option<&Entry>) -> DomainResult<u64> {
    match entry.map(|e| &e.value) {
        None => Ok(0),
        Some(StoredValue::Counter(n)) => Ok(*n),
        Some(StoredValue::Blob(bytes)) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| DomainError::Persistence(format!("key {key} does not hold a counter"))),
    }
}

#[async_trait]
impl SharedStore for InMemorySharedStore {
    async fn get(&self, key: &str) -> DomainResult<Option<Vec<u8>>> {
        let entries = self.entries.lock().await;
        Ok(live(&entries, key, Instant::now()).map(|entry| match &entry.value {
            StoredValue::Blob(bytes) => bytes.clone(),
            StoredValue::Counter(n) => n.to_string().into_bytes(),
        }))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> DomainResult<()> {
        let now = Instant::now();
        let expires_at = ttl.map(|ttl| now + ttl);
        let mut entries = self.entries.lock().await;
        self.sweep_if_due(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Blob(value.to_vec()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> DomainResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        self.sweep_if_due(&mut entries, now);
        if live(&entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Blob(value.to_vec()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> DomainResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let matches = matches!(
            live(&entries, key, now),
            Some(Entry { value: StoredValue::Blob(bytes), .. }) if bytes.as_slice() == expected
        );
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn delete(&self, keys: &[&str]) -> DomainResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(*key) {
                if entry.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn get_counter(&self, key: &str) -> DomainResult<Option<u64>> {
        let entries = self.entries.lock().await;
        match live(&entries, key, Instant::now()) {
            None => Ok(None),
            entry => counter_value(key, entry).map(Some),
        }
    }

    async fn commit_versioned(&self, counter_key: &str, key: &str, value: &[u8]) -> DomainResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        self.sweep_if_due(&mut entries, now);
        let next = counter_value(counter_key, live(&entries, counter_key, now))? + 1;
        entries.insert(
            counter_key.to_string(),
            Entry {
                value: StoredValue::Counter(next),
                expires_at: None,
            },
        );
        entries.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Blob(value.to_vec()),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> DomainResult<Vec<String>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> DomainResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_respects_existing_key() {
        let store = InMemorySharedStore::new();
        assert!(store.set_if_absent("lock:a", b"t1", Duration::from_secs(30)).await.unwrap());
        assert!(!store.set_if_absent("lock:a", b"t2", Duration::from_secs(30)).await.unwrap());
        assert_eq!(store.get("lock:a").await.unwrap(), Some(b"t1".to_vec()));
    }

    #[tokio::test]
    async fn test_expired_key_is_absent() {
        let store = InMemorySharedStore::new();
        assert!(store.set_if_absent("lock:a", b"t1", Duration::from_millis(20)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("lock:a").await.unwrap(), None);
        assert!(store.set_if_absent("lock:a", b"t2", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_equals() {
        let store = InMemorySharedStore::new();
        store.set("lock:a", b"mine", None).await.unwrap();

        assert!(!store.delete_if_equals("lock:a", b"theirs").await.unwrap());
        assert!(store.get("lock:a").await.unwrap().is_some());

        assert!(store.delete_if_equals("lock:a", b"mine").await.unwrap());
        assert!(store.get("lock:a").await.unwrap().is_none());
        assert!(!store.delete_if_equals("lock:a", b"mine").await.unwrap());
    }

    #[tokio::test]
    async fn test_counters() {
        let store = InMemorySharedStore::new();
        assert_eq!(store.get_counter("v").await.unwrap(), None);
        store.commit_versioned("v", "m", b"one").await.unwrap();
        store.commit_versioned("v", "m", b"two").await.unwrap();
        assert_eq!(store.get_counter("v").await.unwrap(), Some(2));
        assert_eq!(store.get("v").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_write_sweeps_expired_entries() {
        let store = InMemorySharedStore::with_sweep_interval(Duration::ZERO);
        store.set("context:r1", b"{}", Some(Duration::from_millis(10))).await.unwrap();
        store.set("context:r2", b"{}", Some(Duration::from_secs(30))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        store.set("model:a", b"1", None).await.unwrap();
        let entries = store.entries.lock().await;
        assert_eq!(entries.len(), 2);
        assert!(!entries.contains_key("context:r1"));
    }

    #[tokio::test]
    async fn test_sweep_waits_for_interval() {
        let store = InMemorySharedStore::with_sweep_interval(Duration::from_secs(60));
        store.set("context:r1", b"{}", Some(Duration::from_millis(10))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        store.set("model:a", b"1", None).await.unwrap();
        assert_eq!(store.entries.lock().await.len(), 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_commit_versioned_writes_both() {
        let store = InMemorySharedStore::new();
        assert_eq!(store.commit_versioned("v:m", "m:m", b"one").await.unwrap(), 1);
        assert_eq!(store.commit_versioned("v:m", "m:m", b"two").await.unwrap(), 2);
        assert_eq!(store.get("m:m").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.get_counter("v:m").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_delete_and_prefix_listing() {
        let store = InMemorySharedStore::new();
        store.set("model:a", b"1", None).await.unwrap();
        store.set("model:b", b"2", None).await.unwrap();
        store.set("model_version:a", b"1", None).await.unwrap();

        assert_eq!(
            store.keys_with_prefix("model:").await.unwrap(),
            vec!["model:a".to_string(), "model:b".to_string()]
        );
        assert_eq!(store.delete(&["model:a", "model:zzz"]).await.unwrap(), 1);
        assert_eq!(store.len().await, 2);
    }
}
