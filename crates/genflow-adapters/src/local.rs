//! Free local engine with deterministic synthetic outputs.
//!
//! No external IO: the "generation" derives a stable digest from the
//! resolved inputs, so the same request always produces the same
//! payload and the pipeline stays reproducible end to end. Useful as
//! the zero-cost fallback candidate and as the workhorse of tests.

use async_trait::async_trait;
use serde_json::json;

use genflow_core::{AdapterError, EngineAdapter, EngineBalance, EngineOutput, GenerationRequest};
use genflow_domain::hashing::hash_value;
use genflow_domain::{EngineCredentials, EngineDescriptor, EngineKind, OperationKind};

pub struct SyntheticLocalEngine {
    descriptor: EngineDescriptor,
}

impl SyntheticLocalEngine {
    /// A local engine advertising the given operations.
    pub fn new(engine_id: &str, operations: impl IntoIterator<Item = OperationKind>) -> Self {
        Self { descriptor: EngineDescriptor::new(engine_id, EngineKind::Local, operations) }
    }

    /// Convenience: a local engine that does everything.
    pub fn full(engine_id: &str) -> Self {
        Self::new(engine_id,
                  [OperationKind::GenerateImage,
                   OperationKind::GenerateVideo,
                   OperationKind::ApplyLipSync,
                   OperationKind::Upscale])
    }

    fn synthesize(&self, op: OperationKind, request: &GenerationRequest) -> EngineOutput {
        let digest = hash_value(&json!({
            "engine": self.descriptor.engine_id(),
            "operation": op,
            "inputs": request.inputs,
            "quality": request.quality,
        }));
        EngineOutput { payload: json!({
                           "operation": op.to_string(),
                           "digest": digest,
                           "quality": request.quality.to_string(),
                       }),
                       metadata: json!({
                           "engine": self.descriptor.engine_id(),
                           "synthetic": true,
                       }) }
    }
}

#[async_trait]
impl EngineAdapter for SyntheticLocalEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn verify_identity(&self, _credentials: &EngineCredentials) -> Result<bool, AdapterError> {
        // Local engines accept any (even empty) credential.
        Ok(true)
    }

    async fn check_balance(&self) -> Result<EngineBalance, AdapterError> {
        Ok(EngineBalance::free())
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn generate_image(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        Ok(self.synthesize(OperationKind::GenerateImage, request))
    }

    async fn generate_video(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        Ok(self.synthesize(OperationKind::GenerateVideo, request))
    }

    async fn apply_lip_sync(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        Ok(self.synthesize(OperationKind::ApplyLipSync, request))
    }

    async fn upscale(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        Ok(self.synthesize(OperationKind::Upscale, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request() -> GenerationRequest {
        GenerationRequest { job_id: Uuid::nil(),
                            step_id: "image".into(),
                            inputs: serde_json::json!({"prompt": "a lighthouse"}),
                            quality: genflow_domain::QualityLevel::Standard }
    }

    #[tokio::test]
    async fn outputs_are_deterministic_per_inputs() {
        let engine = SyntheticLocalEngine::full("local");
        let a = engine.generate_image(&request()).await.unwrap();
        let b = engine.generate_image(&request()).await.unwrap();
        assert_eq!(a.payload, b.payload);
    }

    #[tokio::test]
    async fn unsupported_operation_is_contract_mismatch() {
        let engine = SyntheticLocalEngine::new("img-only", [OperationKind::GenerateImage]);
        let err = genflow_core::adapter::dispatch(&engine, OperationKind::Upscale, &request())
            .await
            .unwrap_err();
        assert_eq!(err.code, genflow_domain::ErrorCode::ContractMismatch);
    }

    #[tokio::test]
    async fn local_engine_is_free_and_healthy() {
        let engine = SyntheticLocalEngine::full("local");
        assert!(engine.health_check().await);
        assert_eq!(engine.check_balance().await.unwrap().balance, 0.0);
        assert!(engine.verify_identity(&EngineCredentials::none()).await.unwrap());
    }
}
