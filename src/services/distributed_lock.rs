//! Per-model mutual exclusion over the shared store.
//!
//! A lock is a key holding a random token with a time-to-live. Only the
//! holder of the token can release it; expiry frees locks of crashed holders.
//! A token dropped without an explicit release (a cancelled caller) releases
//! itself in the background.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::keys::KeySpace;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::LockSettings;
use crate::domain::ports::SharedStore;

/// Proof of holding a model's lock.
#[must_use = "a lock token must be released"]
pub struct LockToken {
    model_id: String,
    key: String,
    token: String,
    store: Arc<dyn SharedStore>,
    released: bool,
}

impl LockToken {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

impl std::fmt::Debug for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockToken")
            .field("model_id", &self.model_id)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(model_id = %self.model_id, "lock dropped outside a runtime, left to expire");
            return;
        };
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        let model_id = std::mem::take(&mut self.model_id);
        handle.spawn(async move {
            match store.delete_if_equals(&key, token.as_bytes()).await {
                Ok(true) => debug!(model_id = %model_id, "abandoned lock released"),
                Ok(false) => debug!(model_id = %model_id, "abandoned lock already expired"),
                Err(e) => warn!(model_id = %model_id, error = %e, "failed to release abandoned lock"),
            }
        });
    }
}

pub struct DistributedLock {
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn SharedStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Acquire the lock, trying `retry_count` times `retry_delay_ms` apart.
    pub async fn acquire(&self, model_id: &str, settings: &LockSettings) -> DomainResult<LockToken> {
        let key = self.keys.lock(model_id);
        let token = Uuid::new_v4().simple().to_string();
        let ttl = Duration::from_millis(settings.expiry_ms);
        let delay = Duration::from_millis(settings.retry_delay_ms);

        for attempt in 1..=settings.retry_count {
            if self.store.set_if_absent(&key, token.as_bytes(), ttl).await? {
                debug!(model_id, attempt, "lock acquired");
                return Ok(LockToken {
                    model_id: model_id.to_string(),
                    key,
                    token,
                    store: self.store.clone(),
                    released: false,
                });
            }
            if attempt < settings.retry_count {
                debug!(model_id, attempt, "lock busy, retrying");
                tokio::time::sleep(delay).await;
            }
        }

        Err(DomainError::LockUnavailable {
            model_id: model_id.to_string(),
            attempts: settings.retry_count,
        })
    }

    /// Release a held lock. Mismatches and store errors are logged only.
    pub async fn release(&self, mut lock: LockToken) {
        lock.released = true;
        match self.store.delete_if_equals(&lock.key, lock.token.as_bytes()).await {
            Ok(true) => debug!(model_id = %lock.model_id, "lock released"),
            Ok(false) => warn!(model_id = %lock.model_id, "lock already expired or taken over"),
            Err(e) => warn!(model_id = %lock.model_id, error = %e, "failed to release lock"),
        }
    }
}
