//! Short-lived storage of recommendation contexts.
//!
//! A caller that receives a recommendation can later report the reward with
//! just the request id; the context it was served under is looked up here.
//! The stash is best effort: failures are logged and read as a miss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::keys::KeySpace;
use crate::domain::errors::DomainResult;
use crate::domain::models::RawContext;
use crate::domain::ports::SharedStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StashedContext {
    pub model_id: String,
    pub context: RawContext,
    pub timestamp: DateTime<Utc>,
}

pub struct ContextStash {
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
}

impl ContextStash {
    pub fn new(store: Arc<dyn SharedStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Remember the context served for `request_id`. Returns whether it was stored.
    pub async fn put(&self, request_id: &str, model_id: &str, context: &RawContext, ttl: Duration) -> bool {
        let record = StashedContext {
            model_id: model_id.to_string(),
            context: context.clone(),
            timestamp: Utc::now(),
        };
        let bytes = match serde_json::to_vec(&record) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(request_id, error = %e, "failed to encode stashed context");
                return false;
            }
        };

        match self.store.set(&self.keys.context(request_id), &bytes, Some(ttl)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(request_id, error = %e, "failed to stash context");
                false
            }
        }
    }

    /// Context stashed for `request_id` by the same model, if any.
    pub async fn fetch(&self, request_id: &str, model_id: &str) -> Option<RawContext> {
        let bytes = match self.store.get(&self.keys.context(request_id)).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(request_id, error = %e, "failed to read stashed context");
                return None;
            }
        };

        match serde_json::from_slice::<StashedContext>(&bytes) {
            Ok(record) if record.model_id == model_id => Some(record.context),
            Ok(record) => {
                debug!(request_id, stashed_for = %record.model_id, model_id, "stashed context belongs to another model");
                None
            }
            Err(e) => {
                warn!(request_id, error = %e, "discarding unreadable stashed context");
                None
            }
        }
    }

    /// Number of live stashed contexts.
    pub async fn count(&self) -> DomainResult<usize> {
        Ok(self.store.keys_with_prefix(&self.keys.context_prefix()).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySharedStore;
    use serde_json::json;

    fn stash() -> ContextStash {
        ContextStash::new(Arc::new(InMemorySharedStore::new()), KeySpace::default())
    }

    fn context() -> RawContext {
        serde_json::from_value(json!({"feature_device": "mobile", "feature_age": 31})).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_fetch() {
        let stash = stash();
        assert!(stash.put("r1", "m1", &context(), Duration::from_secs(60)).await);

        assert_eq!(stash.fetch("r1", "m1").await, Some(context()));
        assert_eq!(stash.fetch("r1", "m2").await, None);
        assert_eq!(stash.fetch("missing", "m1").await, None);
        assert_eq!(stash.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_context_is_a_miss() {
        let stash = stash();
        stash.put("r1", "m1", &context(), Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(stash.fetch("r1", "m1").await, None);
        assert_eq!(stash.count().await.unwrap(), 0);
    }
}
