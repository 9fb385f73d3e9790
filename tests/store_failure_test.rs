//! Behaviour when the shared store rejects writes or goes away.

mod common;

use common::{context, service_on, settings, two_arms, FailingStore, RecordingPolicy};
use serde_json::json;
use std::sync::Arc;

use scout::domain::models::{ArmRef, RawContext};
use scout::services::{RecommendRequest, UpdateRecord};
use scout::DomainError;

fn update(decision: &str) -> UpdateRecord {
    UpdateRecord {
        decision: ArmRef::Label(decision.to_string()),
        reward: 1.0,
        context: RawContext::new(),
        request_id: None,
    }
}

#[tokio::test]
async fn test_failed_commit_leaves_store_and_cache_unchanged() {
    let store = Arc::new(FailingStore::new());
    let service = service_on::<RecordingPolicy>(store.clone(), settings(2));
    let id = service.create_model("fragile", two_arms(), RecordingPolicy::default()).await.unwrap();
    assert_eq!(service.model_store().cached_version(&id).await, Some(1));

    store.fail_commits(true);
    let err = service.update_model(&id, vec![update("a")]).await.unwrap_err();
    assert!(matches!(err, DomainError::Persistence(_)));
    assert!(err.is_retryable());

    assert_eq!(service.model_store().cached_version(&id).await, Some(1));
    let model = service.model_store().load(&id, false).await.unwrap();
    assert_eq!(model.version, 1);
    assert_eq!(model.counters.update_count, 0);

    store.fail_commits(false);
    service.update_model(&id, vec![update("a")]).await.unwrap();
    let model = service.get_model(&id).await.unwrap();
    assert_eq!(model.version, 2);
    assert_eq!(model.counters.update_count, 1);
}

#[tokio::test]
async fn test_lock_is_released_after_failed_commit() {
    let store = Arc::new(FailingStore::new());
    let mut quick = settings(2);
    quick.lock.retry_count = 2;
    let service = service_on::<RecordingPolicy>(store.clone(), quick);
    let id = service.create_model("fragile", two_arms(), RecordingPolicy::default()).await.unwrap();

    store.fail_commits(true);
    assert!(service.recommend(&id, RecommendRequest::default()).await.is_err());
    store.fail_commits(false);

    // A leaked lock would make this fail with LockUnavailable.
    service.recommend(&id, RecommendRequest::default()).await.unwrap();
}

#[tokio::test]
async fn test_unreachable_store() {
    let store = Arc::new(FailingStore::new());
    let service = service_on::<RecordingPolicy>(store.clone(), settings(2));
    let id = service.create_model("offline", two_arms(), RecordingPolicy::default()).await.unwrap();
    service
        .recommend(
            &id,
            RecommendRequest {
                context: context(json!({"device": "mobile"})),
                request_id: Some("req-1".to_string()),
            },
        )
        .await
        .unwrap();

    let health = service.health().await;
    assert!(health.store_healthy);
    assert_eq!(health.context_keys, Some(1));

    store.fail_all(true);
    let health = service.health().await;
    assert!(!health.store_healthy);
    assert_eq!(health.context_keys, None);

    assert!(matches!(
        service.update_model(&id, vec![update("a")]).await,
        Err(DomainError::Persistence(_))
    ));
    assert!(matches!(service.list_models().await, Err(DomainError::Persistence(_))));
}
