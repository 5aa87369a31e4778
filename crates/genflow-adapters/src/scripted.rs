//! Scriptable engine for orchestrator tests.
//!
//! Outcomes are queued per engine and consumed one per generation call,
//! which makes fallback chains, timeouts and safety rejections easy to
//! stage. Once the script runs dry the engine succeeds, so a test only
//! scripts the interesting prefix.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use genflow_core::{AdapterError, EngineAdapter, EngineBalance, EngineOutput, GenerationRequest};
use genflow_domain::{EngineCredentials, EngineDescriptor, EngineKind, ErrorCode, OperationKind};

#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Succeed,
    Fail(ErrorCode),
    /// Stall for the given time, then succeed; pairs with a short
    /// attempt timeout to exercise ENGINE_TIMEOUT paths.
    Stall(Duration),
}

pub struct ScriptedEngine {
    descriptor: EngineDescriptor,
    script: Mutex<VecDeque<ScriptedOutcome>>,
    calls: AtomicU32,
    healthy: AtomicBool,
    accept_credentials: bool,
}

impl ScriptedEngine {
    pub fn new(engine_id: &str, operations: impl IntoIterator<Item = OperationKind>) -> Self {
        Self { descriptor: EngineDescriptor::new(engine_id, EngineKind::Remote, operations),
               script: Mutex::new(VecDeque::new()),
               calls: AtomicU32::new(0),
               healthy: AtomicBool::new(true),
               accept_credentials: true }
    }

    pub fn full(engine_id: &str) -> Self {
        Self::new(engine_id,
                  [OperationKind::GenerateImage,
                   OperationKind::GenerateVideo,
                   OperationKind::ApplyLipSync,
                   OperationKind::Upscale])
    }

    pub fn rejecting_credentials(mut self) -> Self {
        self.accept_credentials = false;
        self
    }

    /// Queue the next outcomes, in call order.
    pub fn script(self, outcomes: impl IntoIterator<Item = ScriptedOutcome>) -> Self {
        self.push_outcomes(outcomes);
        self
    }

    pub fn push_outcomes(&self, outcomes: impl IntoIterator<Item = ScriptedOutcome>) {
        let mut script = self.script.lock().unwrap_or_else(|p| p.into_inner());
        script.extend(outcomes);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Generation calls that actually reached this engine.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next(&self, op: OperationKind, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = {
            let mut script = self.script.lock().unwrap_or_else(|p| p.into_inner());
            script.pop_front().unwrap_or(ScriptedOutcome::Succeed)
        };
        match outcome {
            ScriptedOutcome::Succeed => {}
            ScriptedOutcome::Fail(code) => {
                return Err(AdapterError::new(code, format!("scripted {code} from '{}'",
                                                           self.descriptor.engine_id())));
            }
            ScriptedOutcome::Stall(pause) => tokio::time::sleep(pause).await,
        }
        Ok(EngineOutput { payload: json!({
                              "operation": op.to_string(),
                              "step": request.step_id,
                              "call": self.calls(),
                          }),
                          metadata: json!({"engine": self.descriptor.engine_id()}) })
    }
}

#[async_trait]
impl EngineAdapter for ScriptedEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn verify_identity(&self, _credentials: &EngineCredentials) -> Result<bool, AdapterError> {
        Ok(self.accept_credentials)
    }

    async fn check_balance(&self) -> Result<EngineBalance, AdapterError> {
        Ok(EngineBalance { balance: 42.0, currency: "USD".into() })
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn generate_image(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        self.next(OperationKind::GenerateImage, request).await
    }

    async fn generate_video(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        self.next(OperationKind::GenerateVideo, request).await
    }

    async fn apply_lip_sync(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        self.next(OperationKind::ApplyLipSync, request).await
    }

    async fn upscale(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        self.next(OperationKind::Upscale, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request() -> GenerationRequest {
        GenerationRequest { job_id: Uuid::nil(),
                            step_id: "s".into(),
                            inputs: json!({}),
                            quality: genflow_domain::QualityLevel::Low }
    }

    #[tokio::test]
    async fn script_is_consumed_in_order_then_succeeds() {
        let engine = ScriptedEngine::full("flaky")
            .script([ScriptedOutcome::Fail(ErrorCode::EngineOffline), ScriptedOutcome::Succeed]);
        let first = engine.generate_image(&request()).await;
        assert_eq!(first.unwrap_err().code, ErrorCode::EngineOffline);
        assert!(engine.generate_image(&request()).await.is_ok());
        // Dry script keeps succeeding.
        assert!(engine.generate_image(&request()).await.is_ok());
        assert_eq!(engine.calls(), 3);
    }

    #[tokio::test]
    async fn health_flag_is_observable() {
        let engine = ScriptedEngine::full("e");
        assert!(engine.health_check().await);
        engine.set_healthy(false);
        assert!(!engine.health_check().await);
    }
}
