//! Versioned model persistence with a local read-through cache.
//!
//! Every save bumps a per-model counter and writes the blob in one store
//! operation. The cache holds `(model, version)` pairs and is trusted only
//! while its version matches the store's counter.

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::keys::KeySpace;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::BanditModel;
use crate::domain::ports::{DecisionPolicy, SharedStore};

/// Current layout of the stored blob.
pub const SCHEMA_VERSION: u32 = 1;

/// Maximum number of models kept in the local cache.
const MODEL_CACHE_MAX_CAPACITY: u64 = 1_000;

#[derive(Serialize)]
struct EnvelopeRef<'a, P> {
    schema_version: u32,
    model: &'a BanditModel<P>,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    schema_version: u32,
}

#[derive(Deserialize)]
struct Envelope<P> {
    model: BanditModel<P>,
}

/// Serialize a model into its versioned blob.
pub fn encode_model<P: Serialize>(model: &BanditModel<P>) -> DomainResult<Vec<u8>> {
    Ok(serde_json::to_vec(&EnvelopeRef {
        schema_version: SCHEMA_VERSION,
        model,
    })?)
}

/// Deserialize a blob written by [`encode_model`].
pub fn decode_model<P: DecisionPolicy>(bytes: &[u8]) -> DomainResult<BanditModel<P>> {
    let header: EnvelopeHeader = serde_json::from_slice(bytes)?;
    if header.schema_version != SCHEMA_VERSION {
        return Err(DomainError::Serialization(format!(
            "unsupported model schema version {}",
            header.schema_version
        )));
    }
    let envelope: Envelope<P> = serde_json::from_slice(bytes)?;
    Ok(envelope.model)
}

#[derive(Clone)]
struct CachedModel<P> {
    model: Arc<BanditModel<P>>,
    version: u64,
}

pub struct VersionedModelStore<P: DecisionPolicy> {
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
    cache: Cache<String, CachedModel<P>>,
}

impl<P: DecisionPolicy> VersionedModelStore<P> {
    pub fn new(store: Arc<dyn SharedStore>, keys: KeySpace) -> Self {
        Self {
            store,
            keys,
            cache: Cache::builder().max_capacity(MODEL_CACHE_MAX_CAPACITY).build(),
        }
    }

    /// Persist a new model (version 1) and return its id.
    pub async fn create(&self, model: &mut BanditModel<P>) -> DomainResult<String> {
        self.save(model).await?;
        Ok(model.id.clone())
    }

    /// Load the current state of a model.
    ///
    /// With `use_cache`, a cached copy is returned when its version equals
    /// the stored counter; any other load refreshes the cache.
    pub async fn load(&self, model_id: &str, use_cache: bool) -> DomainResult<BanditModel<P>> {
        let version = self
            .store
            .get_counter(&self.keys.model_version(model_id))
            .await?
            .unwrap_or(0);

        if use_cache {
            if let Some(cached) = self.cache.get(model_id).await {
                if cached.version == version {
                    debug!(model_id, version, "model cache hit");
                    let mut model = (*cached.model).clone();
                    model.version = version;
                    return Ok(model);
                }
                debug!(model_id, cached = cached.version, current = version, "model cache stale");
            }
        }

        let bytes = self
            .store
            .get(&self.keys.model(model_id))
            .await?
            .ok_or_else(|| DomainError::ModelNotFound(model_id.to_string()))?;
        let mut model: BanditModel<P> = decode_model(&bytes)?;
        model.version = version;

        if use_cache {
            self.cache
                .insert(
                    model_id.to_string(),
                    CachedModel {
                        model: Arc::new(model.clone()),
                        version,
                    },
                )
                .await;
        }
        Ok(model)
    }

    /// Persist the model under the next version.
    ///
    /// On success `model.version` holds the new version and the cache holds
    /// a copy. On failure neither the model nor the cache changes.
    pub async fn save(&self, model: &mut BanditModel<P>) -> DomainResult<u64> {
        let bytes = encode_model(model)?;
        let version = self
            .store
            .commit_versioned(&self.keys.model_version(&model.id), &self.keys.model(&model.id), &bytes)
            .await?;

        model.version = version;
        self.cache
            .insert(
                model.id.clone(),
                CachedModel {
                    model: Arc::new(model.clone()),
                    version,
                },
            )
            .await;
        debug!(model_id = %model.id, version, bytes = bytes.len(), "model saved");
        Ok(version)
    }

    /// Remove the blob, the version counter and the cached copy.
    ///
    /// Returns `false` if nothing was stored under the id.
    pub async fn delete(&self, model_id: &str) -> DomainResult<bool> {
        let model_key = self.keys.model(model_id);
        let version_key = self.keys.model_version(model_id);
        let removed = self.store.delete(&[model_key.as_str(), version_key.as_str()]).await?;
        self.cache.invalidate(model_id).await;
        Ok(removed > 0)
    }

    /// Ids of all stored models.
    pub async fn list_ids(&self) -> DomainResult<Vec<String>> {
        let keys = self.store.keys_with_prefix(&self.keys.model_prefix()).await?;
        Ok(keys
            .iter()
            .filter_map(|key| self.keys.model_id_from_key(key))
            .map(ToString::to_string)
            .collect())
    }

    /// Version of the locally cached copy, if any.
    pub async fn cached_version(&self, model_id: &str) -> Option<u64> {
        self.cache.get(model_id).await.map(|cached| cached.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySharedStore;
    use crate::adapters::policies::{EpsilonGreedy, PolicyKind};
    use crate::domain::models::{ArmLabel, FitState, Observation};
    use std::collections::BTreeMap;

    fn store() -> (Arc<InMemorySharedStore>, VersionedModelStore<PolicyKind>) {
        let shared = Arc::new(InMemorySharedStore::new());
        let models = VersionedModelStore::new(shared.clone(), KeySpace::default());
        (shared, models)
    }

    fn model(id: &str) -> BanditModel<PolicyKind> {
        let labels = BTreeMap::from([(0, ArmLabel::from("a")), (1, ArmLabel::from("b"))]);
        BanditModel::new(id, "checkout", labels, PolicyKind::EpsilonGreedy(EpsilonGreedy::default())).unwrap()
    }

    #[tokio::test]
    async fn test_versions_increase_by_one_per_save() {
        let (_, models) = store();
        let mut m = model("m1");
        models.create(&mut m).await.unwrap();
        assert_eq!(m.version, 1);

        for expected in 2..=6 {
            m.counters.update_count += 1;
            assert_eq!(models.save(&mut m).await.unwrap(), expected);
        }
        assert_eq!(models.load("m1", true).await.unwrap().version, 6);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_state() {
        let (_, models) = store();
        let mut m = model("m1");
        m.fit_state = FitState::Cold {
            buffer: vec![Observation {
                decision: 1,
                reward: 0.5,
                context: vec![1.0, 0.0],
            }],
        };
        m.context_schema.feature_order = vec!["f1".to_string(), "f2".to_string()];
        m.rollout(1);
        models.save(&mut m).await.unwrap();

        let loaded = models.load("m1", false).await.unwrap();
        assert_eq!(loaded, m);
    }

    #[tokio::test]
    async fn test_load_detects_writes_from_other_processes() {
        let (shared, models) = store();
        let mut m = model("m1");
        models.create(&mut m).await.unwrap();
        assert_eq!(models.cached_version("m1").await, Some(1));

        // A second process with its own cache writes a newer version.
        let other = VersionedModelStore::<PolicyKind>::new(shared, KeySpace::default());
        let mut remote = other.load("m1", true).await.unwrap();
        remote.counters.prediction_count = 42;
        other.save(&mut remote).await.unwrap();

        let loaded = models.load("m1", true).await.unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.counters.prediction_count, 42);
        assert_eq!(models.cached_version("m1").await, Some(2));
    }

    #[tokio::test]
    async fn test_missing_model_is_not_found() {
        let (_, models) = store();
        let err = models.load("ghost", true).await.unwrap_err();
        assert!(matches!(err, DomainError::ModelNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (shared, models) = store();
        let mut m = model("m1");
        models.create(&mut m).await.unwrap();

        assert!(models.delete("m1").await.unwrap());
        assert!(!models.delete("m1").await.unwrap());
        assert!(shared.is_empty().await);
        assert_eq!(models.cached_version("m1").await, None);
        assert!(models.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_ids() {
        let (_, models) = store();
        models.create(&mut model("b")).await.unwrap();
        models.create(&mut model("a")).await.unwrap();
        assert_eq!(models.list_ids().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_unknown_schema_version_is_rejected() {
        let blob = br#"{"schema_version": 99, "model": {}}"#;
        let err = decode_model::<PolicyKind>(blob).unwrap_err();
        assert!(matches!(err, DomainError::Serialization(msg) if msg.contains("99")));
    }
}
