//! Shared harness for orchestrator integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::json;
use uuid::Uuid;

use genflow_core::{CreditLedger, EngineAdapter, InMemoryArtifactStore, InMemoryEventStore,
                   PipelineJob, PipelineManager, PresetCatalog, ProviderRegistry, SubmitRequest};
use genflow_domain::{EngineCredentials, OperationKind, PresetStep, QualityLevel, WorkflowPreset};
use genflow_policies::{CostTable, RetryPolicy};

pub const ACCOUNT: &str = "acct-tests";

pub type TestManager = PipelineManager<InMemoryEventStore, InMemoryArtifactStore>;

pub struct Harness {
    pub manager: Arc<TestManager>,
    pub events: Arc<InMemoryEventStore>,
    pub artifacts: Arc<InMemoryArtifactStore>,
    pub ledger: Arc<CreditLedger>,
}

/// Fixed prices used across the scenarios: image 5 on the primary,
/// 3 on the spare, upscale 4, lip sync 6, flat across qualities.
pub fn test_costs() -> CostTable {
    let mut t = CostTable::default();
    for quality in [QualityLevel::Low, QualityLevel::Standard, QualityLevel::Pro] {
        t = t.with_entry("img-main", OperationKind::GenerateImage, quality, 5)
             .with_entry("img-spare", OperationKind::GenerateImage, quality, 3)
             .with_entry("up-main", OperationKind::Upscale, quality, 4)
             .with_entry("sync-main", OperationKind::ApplyLipSync, quality, 6);
    }
    t
}

/// Unstarted manager over in-memory stores; tests spawn workers when
/// the stage is set.
pub fn harness(presets: Vec<WorkflowPreset>, initial_credits: u64) -> Harness {
    let events = Arc::new(InMemoryEventStore::new());
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    // Zero staleness so health flags flipped mid-test are seen at once.
    let registry = Arc::new(ProviderRegistry::new(Duration::ZERO));
    let ledger = Arc::new(CreditLedger::new());
    ledger.credit(ACCOUNT, initial_credits);
    let catalog = Arc::new(PresetCatalog::new());
    for preset in presets {
        catalog.publish(preset).unwrap();
    }
    let manager = Arc::new(PipelineManager::new(Arc::clone(&events),
                                                Arc::clone(&artifacts),
                                                registry,
                                                Arc::clone(&ledger),
                                                catalog,
                                                Arc::new(test_costs()),
                                                RetryPolicy::fast(),
                                                8));
    Harness { manager, events, artifacts, ledger }
}

pub async fn register(manager: &Arc<TestManager>, adapter: Arc<dyn EngineAdapter>) {
    let response = manager.register_provider(adapter, &EngineCredentials::new("test-key"), false).await;
    assert!(response.ok, "registration failed: {:?}", response.error);
}

/// Two-step pipeline: image on the primary engine, then upscale fed by
/// the image artifact.
pub fn image_then_upscale() -> WorkflowPreset {
    WorkflowPreset::publish(
        "image-then-upscale",
        1,
        &["prompt"],
        &[],
        vec![PresetStep::new("image", OperationKind::GenerateImage, &["img-main"]),
             PresetStep::new("upscale", OperationKind::Upscale, &["up-main"])
                 .depends_on(&["image"])
                 .params(json!({"source": "{{image.output}}"}))],
        &[QualityLevel::Low, QualityLevel::Standard, QualityLevel::Pro],
        false,
        IndexMap::new(),
    )
    .unwrap()
}

/// Single image step with a fallback candidate.
pub fn image_with_fallback() -> WorkflowPreset {
    WorkflowPreset::publish(
        "image-fallback",
        1,
        &["prompt"],
        &[],
        vec![PresetStep::new("image", OperationKind::GenerateImage, &["img-main", "img-spare"])],
        &[QualityLevel::Standard],
        false,
        IndexMap::new(),
    )
    .unwrap()
}

/// Identity-bearing preset: the lip sync step consumes a face
/// reference, so submission requires consent.
pub fn lipsync_preset() -> WorkflowPreset {
    WorkflowPreset::publish(
        "lipsync",
        1,
        &["face_ref", "audio"],
        &[],
        vec![PresetStep::new("sync", OperationKind::ApplyLipSync, &["sync-main"])
                 .identity_inputs(&["face_ref"])],
        &[QualityLevel::Standard],
        true,
        IndexMap::new(),
    )
    .unwrap()
}

pub fn submit_request(preset_id: &str, inputs: serde_json::Value, consent: bool) -> SubmitRequest {
    SubmitRequest { preset_id: preset_id.to_string(),
                    preset_version: 1,
                    account_id: ACCOUNT.to_string(),
                    inputs,
                    quality: QualityLevel::Standard,
                    consent_given: consent }
}

pub async fn wait_terminal(manager: &Arc<TestManager>, job_id: Uuid) -> PipelineJob {
    for _ in 0..500 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if let Ok(Some(view)) = manager.status(job_id) {
            if view.job.status.is_terminal() {
                return view.job;
            }
        }
    }
    panic!("job {job_id} never reached a terminal status");
}
