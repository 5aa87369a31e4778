//! Provider registration, credential handling and health gating.

use std::sync::Arc;
use std::time::Duration;

use genflow_adapters::ScriptedEngine;
use genflow_core::{EngineAdapter, ProviderRegistry, ProviderStatus};
use genflow_domain::{EngineCredentials, ErrorCode, OperationKind};

fn engine(id: &str) -> Arc<ScriptedEngine> {
    Arc::new(ScriptedEngine::new(id, [OperationKind::GenerateImage]))
}

#[tokio::test]
async fn registration_reports_balance_and_redacts_credentials() {
    let registry = ProviderRegistry::new(Duration::from_secs(60));
    let creds = EngineCredentials::new("sk-super-secret");
    let balance = registry.register(engine("remote"), &creds, false).await.unwrap();
    assert_eq!(balance.currency, "USD");

    let views = registry.list_all();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].status, ProviderStatus::Connected);
    // Only a fingerprint is exposed; the secret itself never appears.
    assert_eq!(views[0].credential_fingerprint, creds.fingerprint());
    assert!(!views[0].credential_fingerprint.contains("sk-super-secret"));
}

#[tokio::test]
async fn reregistering_with_different_credentials_requires_replace() {
    let registry = ProviderRegistry::new(Duration::from_secs(60));
    registry.register(engine("remote"), &EngineCredentials::new("key-a"), false).await.unwrap();

    let err = registry.register(engine("remote"), &EngineCredentials::new("key-b"), false)
                      .await
                      .unwrap_err();
    assert_eq!(err.info().unwrap().code, ErrorCode::ValidationError);

    // Same credential is a plain refresh; replace overrides.
    registry.register(engine("remote"), &EngineCredentials::new("key-a"), false).await.unwrap();
    registry.register(engine("remote"), &EngineCredentials::new("key-b"), true).await.unwrap();
}

#[tokio::test]
async fn rejected_credentials_never_register_the_provider() {
    let registry = ProviderRegistry::new(Duration::from_secs(60));
    let adapter = Arc::new(ScriptedEngine::new("strict", [OperationKind::GenerateImage])
        .rejecting_credentials());
    let err = registry.register(adapter, &EngineCredentials::new("wrong"), false).await.unwrap_err();
    assert_eq!(err.info().unwrap().code, ErrorCode::ValidationError);
    assert!(registry.get("strict").is_none());
}

#[tokio::test]
async fn health_snapshot_marks_unhealthy_without_faulting_the_listing() {
    let registry = ProviderRegistry::new(Duration::ZERO);
    let good = engine("good");
    let bad = engine("bad");
    registry.register(Arc::clone(&good) as Arc<dyn EngineAdapter>, &EngineCredentials::none(), false)
            .await
            .unwrap();
    registry.register(Arc::clone(&bad) as Arc<dyn EngineAdapter>, &EngineCredentials::none(), false)
            .await
            .unwrap();
    bad.set_healthy(false);

    let views = registry.health_snapshot().await;
    assert_eq!(views.len(), 2);
    let by_id = |id: &str| views.iter().find(|v| v.engine_id == id).unwrap();
    assert_eq!(by_id("good").status, ProviderStatus::Connected);
    assert_eq!(by_id("bad").status, ProviderStatus::Error);
    assert!(!by_id("bad").last_health.as_ref().unwrap().healthy);
}

#[tokio::test]
async fn stale_health_is_reprobed_and_unknown_engines_are_unhealthy() {
    let registry = ProviderRegistry::new(Duration::ZERO);
    let flappy = engine("flappy");
    registry.register(Arc::clone(&flappy) as Arc<dyn EngineAdapter>, &EngineCredentials::none(), false)
            .await
            .unwrap();

    assert!(registry.healthy("flappy").await);
    // Zero staleness bound: the flip is observed on the next query.
    flappy.set_healthy(false);
    assert!(!registry.healthy("flappy").await);

    assert!(!registry.healthy("never-registered").await);
}
