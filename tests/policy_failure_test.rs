//! Lock and persistence behaviour when the decision policy fails or a
//! caller gives up mid-update.

mod common;

use common::{service_on, settings, two_arms};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use scout::adapters::memory::InMemorySharedStore;
use scout::domain::models::{ArmId, ArmRef, ModelSettings, RawContext};
use scout::services::UpdateRecord;
use scout::{BanditService, DecisionPolicy, DomainError, DomainResult, TrainingBatch};

/// Policy that can be told to fail or to stall its batch fit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FlakyPolicy {
    fail_fit: bool,
    fail_partial_fit: bool,
    fit_delay_ms: u64,
    partial_fits: usize,
}

impl DecisionPolicy for FlakyPolicy {
    fn fit(&mut self, _arms: &[ArmId], _batch: &TrainingBatch) -> DomainResult<()> {
        std::thread::sleep(Duration::from_millis(self.fit_delay_ms));
        if self.fail_fit {
            return Err(DomainError::Policy("fit diverged".to_string()));
        }
        Ok(())
    }

    fn partial_fit(&mut self, _arms: &[ArmId], _batch: &TrainingBatch) -> DomainResult<()> {
        if self.fail_partial_fit {
            return Err(DomainError::Policy("partial fit diverged".to_string()));
        }
        self.partial_fits += 1;
        Ok(())
    }

    fn choose(&self, arms: &[ArmId], _context: &[f64]) -> DomainResult<ArmId> {
        Ok(arms[0])
    }

    fn expected_rewards(&self, arms: &[ArmId], _context: &[f64]) -> DomainResult<BTreeMap<ArmId, f64>> {
        Ok(arms.iter().map(|arm| (*arm, 0.0)).collect())
    }
}

/// Batch fit on the first observation, and a lock that gives up after ~100ms.
fn impatient() -> ModelSettings {
    let mut settings = settings(1);
    settings.lock.retry_count = 20;
    settings
}

fn service() -> BanditService<FlakyPolicy> {
    service_on(Arc::new(InMemorySharedStore::new()), impatient())
}

fn update(decision: &str) -> UpdateRecord {
    UpdateRecord {
        decision: ArmRef::Label(decision.to_string()),
        reward: 1.0,
        context: RawContext::new(),
        request_id: None,
    }
}

#[tokio::test]
async fn test_failed_batch_fit_saves_nothing_and_frees_lock() {
    let service = service();
    let policy = FlakyPolicy {
        fail_fit: true,
        ..FlakyPolicy::default()
    };
    let id = service.create_model("diverging", two_arms(), policy).await.unwrap();

    let err = service.update_model(&id, vec![update("a")]).await.unwrap_err();
    assert!(matches!(err, DomainError::Policy(_)));

    let model = service.get_model(&id).await.unwrap();
    assert_eq!(model.version, 1);
    assert!(!model.is_trained());
    assert!(model.fit_state.buffered().is_empty());
    assert_eq!(model.counters.update_count, 0);

    // The lock is free again: the retry reaches the policy instead of
    // timing out on the lock.
    let err = service.update_model(&id, vec![update("a")]).await.unwrap_err();
    assert!(matches!(err, DomainError::Policy(_)));
    assert_eq!(service.rollout(&id, &ArmRef::Id(1)).await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_partial_fit_keeps_last_saved_state() {
    let service = service();
    let policy = FlakyPolicy {
        fail_partial_fit: true,
        ..FlakyPolicy::default()
    };
    let id = service.create_model("partial", two_arms(), policy).await.unwrap();
    service.update_model(&id, vec![update("a")]).await.unwrap();
    assert!(service.get_model(&id).await.unwrap().is_trained());

    let err = service.update_model(&id, vec![update("b")]).await.unwrap_err();
    assert!(matches!(err, DomainError::Policy(_)));

    let model = service.get_model(&id).await.unwrap();
    assert_eq!(model.version, 2);
    assert_eq!(model.counters.update_count, 1);
    assert_eq!(model.policy.partial_fits, 0);

    service.clear_rollout(&id).await.unwrap();
    assert_eq!(service.get_model(&id).await.unwrap().version, 3);
}

#[tokio::test]
async fn test_cancelled_update_does_not_hold_the_lock() {
    let service = service();
    let slow = FlakyPolicy {
        fit_delay_ms: 300,
        ..FlakyPolicy::default()
    };
    let id = service.create_model("slow", two_arms(), slow).await.unwrap();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        service.update_model(&id, vec![update("a")]),
    )
    .await;
    assert!(cancelled.is_err(), "update should still be fitting");

    // Succeeds well before the 30s lock expiry would.
    let summary = service.update_model(&id, vec![update("b")]).await.unwrap();
    assert_eq!(summary.processed, 1);

    let model = service.get_model(&id).await.unwrap();
    assert_eq!(model.version, 2, "the cancelled update was never saved");
    assert_eq!(model.counters.update_count, 1);
    assert!(model.is_trained());
}
