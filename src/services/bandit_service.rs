//! Model operations behind the request/response boundary.
//!
//! Every mutating operation runs `acquire lock -> load -> mutate -> save ->
//! release`. Encoding and policy calls run on the blocking pool while the
//! lock is held. Listing and details read without the lock and may lag a
//! concurrent writer by one version.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::analytics::{self, ModelDetails};
use super::context_encoder::ContextEncoder;
use super::context_stash::ContextStash;
use super::distributed_lock::DistributedLock;
use super::fit_controller::{FitController, FitOutcome, RecommendationSource};
use super::keys::KeySpace;
use super::model_store::VersionedModelStore;
use super::settings::SettingsHandle;
use super::trail_aggregator::{prediction_ratio, TrailAggregator};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ArmId, ArmLabel, ArmRef, BanditModel, ModelSettings, Observation, PredictionRecord, RawContext,
};
use crate::domain::ports::{DecisionPolicy, SharedStore};

/// One reported outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub decision: ArmRef,
    pub reward: f64,
    #[serde(default)]
    pub context: RawContext,
    /// Request id of the recommendation, to reuse its stashed context
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateSummary {
    pub processed: usize,
    pub missing_context: usize,
    pub context_hits: usize,
    pub total_reward: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub context: RawContext,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub arm: ArmId,
    pub label: ArmLabel,
    pub request_id: String,
    pub source: RecommendationSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub id: String,
    pub name: String,
    pub labels: Vec<ArmLabel>,
    pub global_override: Option<ArmLabel>,
    pub active: bool,
    pub trained: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub update_count: u64,
    pub prediction_count: u64,
    pub last_update_at: Option<DateTime<Utc>>,
    pub last_prediction_at: Option<DateTime<Utc>>,
    pub prediction_ratio: BTreeMap<String, f64>,
    pub features: Vec<String>,
}

impl<P> From<&BanditModel<P>> for ModelSummary {
    fn from(model: &BanditModel<P>) -> Self {
        Self {
            id: model.id.clone(),
            name: model.name.clone(),
            labels: model.labels.values().cloned().collect(),
            global_override: model.global_override.map(|arm| {
                model
                    .label_for_arm(arm)
                    .cloned()
                    .unwrap_or(ArmLabel::Int(arm))
            }),
            active: model.is_active(),
            trained: model.is_trained(),
            version: model.version,
            created_at: model.created_at,
            update_count: model.counters.update_count,
            prediction_count: model.counters.prediction_count,
            last_update_at: model.counters.last_update_at,
            last_prediction_at: model.counters.last_prediction_at,
            prediction_ratio: prediction_ratio(
                &model.trail,
                model.labels.values().map(ToString::to_string),
            ),
            features: model.context_schema.feature_order.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub store_healthy: bool,
    /// Live stashed contexts, `None` when the store is unreachable
    pub context_keys: Option<usize>,
    pub context_ttl_seconds: u64,
}

pub struct BanditService<P: DecisionPolicy> {
    store: Arc<dyn SharedStore>,
    models: VersionedModelStore<P>,
    lock: DistributedLock,
    stash: ContextStash,
    settings: SettingsHandle,
}

impl<P: DecisionPolicy> BanditService<P> {
    pub fn new(store: Arc<dyn SharedStore>, keys: KeySpace, settings: SettingsHandle) -> Self {
        Self {
            models: VersionedModelStore::new(store.clone(), keys.clone()),
            lock: DistributedLock::new(store.clone(), keys.clone()),
            stash: ContextStash::new(store.clone(), keys),
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn model_store(&self) -> &VersionedModelStore<P> {
        &self.models
    }

    /// Run `op` while holding the model's lock. The lock is released on
    /// every path; if this future is dropped mid-section the token releases
    /// itself in the background.
    async fn with_model_lock<T, F, Fut>(&self, model_id: &str, settings: &ModelSettings, op: F) -> DomainResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        let lock = self.lock.acquire(model_id, &settings.lock).await?;
        let result = op().await;
        self.lock.release(lock).await;
        result
    }

    /// Create a model and return its id.
    pub async fn create_model(
        &self,
        name: &str,
        labels: BTreeMap<ArmId, ArmLabel>,
        policy: P,
    ) -> DomainResult<String> {
        if name.trim().is_empty() {
            return Err(DomainError::ValidationFailed("model name cannot be empty".to_string()));
        }
        let mut model = BanditModel::new(Uuid::new_v4().to_string(), name, labels, policy)?;
        let settings = self.settings.snapshot().await;
        let model_id = model.id.clone();

        let pending = &mut model;
        self.with_model_lock(&model_id, &settings, move || self.models.create(pending))
            .await?;
        info!(model_id = %model_id, name, arms = model.arms.len(), "model created");
        Ok(model_id)
    }

    /// Apply reported rewards.
    ///
    /// Every decision is resolved before anything changes; one bad record
    /// rejects the whole batch. The model is saved only if at least one
    /// record was applied.
    pub async fn update_model(&self, model_id: &str, records: Vec<UpdateRecord>) -> DomainResult<UpdateSummary> {
        let settings = self.settings.snapshot().await;
        self.with_model_lock(model_id, &settings, || self.update_locked(model_id, records, &settings))
            .await
    }

    async fn update_locked(
        &self,
        model_id: &str,
        records: Vec<UpdateRecord>,
        settings: &ModelSettings,
    ) -> DomainResult<UpdateSummary> {
        let model = self.models.load(model_id, settings.cache_enabled).await?;

        let mut observations = Vec::with_capacity(records.len());
        for record in &records {
            if !record.reward.is_finite() {
                return Err(DomainError::ValidationFailed(format!(
                    "reward must be a finite number, got {}",
                    record.reward
                )));
            }
            observations.push((model.resolve(&record.decision)?, record.reward));
        }

        let mut context_hits = 0;
        let mut contexts = Vec::with_capacity(records.len());
        for record in records {
            let stashed = match (&record.request_id, settings.context_storage.enabled) {
                (Some(request_id), true) => self.stash.fetch(request_id, model_id).await,
                _ => None,
            };
            match stashed {
                Some(context) if !context.is_empty() => {
                    context_hits += 1;
                    contexts.push(context);
                }
                _ => contexts.push(record.context),
            }
        }

        let fit = FitController::new(&settings.fit);
        let trails = TrailAggregator::new(&settings.trail);
        let (mut model, mut summary) = tokio::task::spawn_blocking(move || {
            apply_updates(model, observations.into_iter().zip(contexts), fit, trails)
        })
        .await
        .map_err(|e| DomainError::Policy(format!("update task failed: {e}")))??;
        summary.context_hits = context_hits;

        if summary.processed > 0 {
            self.models.save(&mut model).await?;
        }
        debug!(
            model_id,
            processed = summary.processed,
            missing_context = summary.missing_context,
            version = model.version,
            "model updated"
        );
        Ok(summary)
    }

    /// Recommend an arm for a context.
    pub async fn recommend(&self, model_id: &str, request: RecommendRequest) -> DomainResult<Recommendation> {
        let settings = self.settings.snapshot().await;
        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        self.with_model_lock(model_id, &settings, || {
            self.recommend_locked(model_id, request.context, request_id, &settings)
        })
        .await
    }

    async fn recommend_locked(
        &self,
        model_id: &str,
        context: RawContext,
        request_id: String,
        settings: &ModelSettings,
    ) -> DomainResult<Recommendation> {
        let model = self.models.load(model_id, settings.cache_enabled).await?;

        if settings.context_storage.enabled && !context.is_empty() {
            let ttl = Duration::from_secs(settings.context_storage.ttl_seconds);
            self.stash.put(&request_id, model_id, &context, ttl).await;
        }

        if let Some(arm) = model.global_override {
            return Ok(Recommendation {
                arm,
                label: model.label_for_arm(arm).cloned().unwrap_or(ArmLabel::Int(arm)),
                request_id,
                source: RecommendationSource::Override,
            });
        }

        let fit = FitController::new(&settings.fit);
        let trails = TrailAggregator::new(&settings.trail);
        let capacity = settings.feature_trail_capacity;
        let (mut model, arm, source) =
            tokio::task::spawn_blocking(move || apply_prediction(model, context, fit, trails, capacity))
                .await
                .map_err(|e| DomainError::Policy(format!("prediction task failed: {e}")))??;

        self.models.save(&mut model).await?;
        Ok(Recommendation {
            arm,
            label: model.label_for_arm(arm).cloned().unwrap_or(ArmLabel::Int(arm)),
            request_id,
            source,
        })
    }

    /// Serve `arm` for every recommendation until cleared.
    pub async fn rollout(&self, model_id: &str, arm: &ArmRef) -> DomainResult<ArmId> {
        let settings = self.settings.snapshot().await;
        self.with_model_lock(model_id, &settings, || async {
            let mut model = self.models.load(model_id, settings.cache_enabled).await?;
            let arm = model.resolve(arm)?;
            model.rollout(arm);
            self.models.save(&mut model).await?;
            info!(model_id, arm, label = %model.label_key(arm), "global rollout enabled");
            Ok(arm)
        })
        .await
    }

    /// Return control to the decision policy.
    pub async fn clear_rollout(&self, model_id: &str) -> DomainResult<()> {
        let settings = self.settings.snapshot().await;
        self.with_model_lock(model_id, &settings, || async {
            let mut model = self.models.load(model_id, settings.cache_enabled).await?;
            model.clear_rollout();
            self.models.save(&mut model).await?;
            info!(model_id, "global rollout cleared");
            Ok(())
        })
        .await
    }

    /// Delete a model. Returns `false` if it did not exist.
    pub async fn delete_model(&self, model_id: &str) -> DomainResult<bool> {
        let settings = self.settings.snapshot().await;
        let deleted = self
            .with_model_lock(model_id, &settings, || self.models.delete(model_id))
            .await?;
        if deleted {
            info!(model_id, "model deleted");
        }
        Ok(deleted)
    }

    /// Summaries of all models. Models deleted while listing are skipped.
    pub async fn list_models(&self) -> DomainResult<Vec<ModelSummary>> {
        let settings = self.settings.snapshot().await;
        let ids = self.models.list_ids().await?;
        let loads = ids.iter().map(|id| self.models.load(id, settings.cache_enabled));

        let mut summaries = Vec::with_capacity(ids.len());
        for (id, result) in ids.iter().zip(join_all(loads).await) {
            match result {
                Ok(model) => summaries.push(ModelSummary::from(&model)),
                Err(DomainError::ModelNotFound(_)) => debug!(model_id = %id, "model vanished while listing"),
                Err(e) => return Err(e),
            }
        }
        Ok(summaries)
    }

    pub async fn get_model(&self, model_id: &str) -> DomainResult<BanditModel<P>> {
        let settings = self.settings.snapshot().await;
        self.models.load(model_id, settings.cache_enabled).await
    }

    pub async fn model_details(&self, model_id: &str) -> DomainResult<ModelDetails> {
        Ok(analytics::model_details(&self.get_model(model_id).await?))
    }

    pub async fn health(&self) -> HealthReport {
        let settings = self.settings.snapshot().await;
        let context_ttl_seconds = settings.context_storage.ttl_seconds;

        if let Err(e) = self.store.ping().await {
            warn!(error = %e, "shared store unreachable");
            return HealthReport {
                store_healthy: false,
                context_keys: None,
                context_ttl_seconds,
            };
        }

        let context_keys = match self.stash.count().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(error = %e, "failed to count stashed contexts");
                None
            }
        };
        HealthReport {
            store_healthy: true,
            context_keys,
            context_ttl_seconds,
        }
    }
}

/// Apply resolved updates to a model. Runs on the blocking pool.
fn apply_updates<P, I>(
    mut model: BanditModel<P>,
    updates: I,
    fit: FitController,
    trails: TrailAggregator,
) -> DomainResult<(BanditModel<P>, UpdateSummary)>
where
    P: DecisionPolicy,
    I: IntoIterator<Item = ((ArmId, f64), RawContext)>,
{
    let mut summary = UpdateSummary::default();

    for ((decision, reward), context) in updates {
        if context.is_empty() && model.context_schema.is_seeded() {
            summary.missing_context += 1;
            continue;
        }

        let encoded = ContextEncoder::encode(&mut model.context_schema, &context)?;
        let outcome = fit.observe(
            &mut model,
            Observation {
                decision,
                reward,
                context: encoded,
            },
        )?;
        if let FitOutcome::Buffered { buffered } = outcome {
            debug!(model_id = %model.id, buffered, "observation buffered");
        }

        let now = Utc::now();
        model.counters.update_count += 1;
        model.counters.last_update_at = Some(now);
        let label = model.label_key(decision);
        trails.record_update(&mut model.trail, &label, reward, now);

        summary.processed += 1;
        summary.total_reward += reward;
    }

    Ok((model, summary))
}

/// Choose an arm and record the prediction. Runs on the blocking pool.
fn apply_prediction<P: DecisionPolicy>(
    mut model: BanditModel<P>,
    context: RawContext,
    fit: FitController,
    trails: TrailAggregator,
    feature_trail_capacity: usize,
) -> DomainResult<(BanditModel<P>, ArmId, RecommendationSource)> {
    let encoded = ContextEncoder::encode(&mut model.context_schema, &context)?;
    let (arm, source) = fit.choose_arm(&model, &encoded)?;

    FitController::record_prediction(&mut model);
    let now = Utc::now();
    let label = model.label_key(arm);
    trails.record_prediction(&mut model.trail, &label, now);
    fit.record_exploitation(&mut model, arm, &encoded)?;

    if !context.is_empty() && feature_trail_capacity > 0 {
        model.feature_trail.push(PredictionRecord { context, arm, at: now });
        let overflow = model.feature_trail.len().saturating_sub(feature_trail_capacity);
        model.feature_trail.drain(..overflow);
    }

    Ok((model, arm, source))
}
