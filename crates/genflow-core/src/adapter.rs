//! Uniform capability interface over one generation backend.
//!
//! Adapters confine their side effects to the wrapped backend and never
//! touch cross-job state. Failures must arrive pre-classified: transport
//! problems (offline, timeout) are distinct from content-level
//! rejections (safety filter), because only the former justify trying a
//! fallback candidate.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use genflow_domain::{EngineCredentials, EngineDescriptor, ErrorCode, ErrorInfo, OperationKind, QualityLevel};

/// Classified adapter failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct AdapterError {
    pub code: ErrorCode,
    pub message: String,
}

impl AdapterError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn offline(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EngineOffline, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EngineTimeout, message)
    }

    pub fn safety(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SafetyFilter, message)
    }

    pub fn contract(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ContractMismatch, message)
    }

    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.code, self.message.clone())
    }
}

/// Provider-side balance snapshot. Free local engines report zero.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngineBalance {
    pub balance: f64,
    pub currency: String,
}

impl EngineBalance {
    pub fn free() -> Self {
        Self { balance: 0.0, currency: "none".into() }
    }
}

/// Result of one generation call.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub payload: Value,
    pub metadata: Value,
}

/// Inputs handed to one generation call; `inputs` has already been
/// resolved (placeholders substituted with artifact refs).
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub job_id: Uuid,
    pub step_id: String,
    pub inputs: Value,
    pub quality: QualityLevel,
}

/// One generation backend behind a uniform contract. The default
/// generation methods reject with CONTRACT_MISMATCH so adapters only
/// implement what their engine actually supports.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    fn descriptor(&self) -> &EngineDescriptor;

    /// Verify the credential against the backend. `false` means the
    /// backend answered and rejected it; transport problems are errors.
    async fn verify_identity(&self, credentials: &EngineCredentials) -> Result<bool, AdapterError>;

    async fn check_balance(&self) -> Result<EngineBalance, AdapterError>;

    /// Cheap liveness probe; never errors, only answers.
    async fn health_check(&self) -> bool;

    async fn generate_image(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        Err(unsupported(self.descriptor(), OperationKind::GenerateImage, request))
    }

    async fn generate_video(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        Err(unsupported(self.descriptor(), OperationKind::GenerateVideo, request))
    }

    async fn apply_lip_sync(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        Err(unsupported(self.descriptor(), OperationKind::ApplyLipSync, request))
    }

    async fn upscale(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        Err(unsupported(self.descriptor(), OperationKind::Upscale, request))
    }
}

fn unsupported(descriptor: &EngineDescriptor, op: OperationKind, _request: &GenerationRequest) -> AdapterError {
    AdapterError::contract(format!("engine '{}' does not implement {op}", descriptor.engine_id()))
}

/// Route an operation kind to the adapter method, guarding on the
/// descriptor so an unsupported call never reaches the backend.
pub async fn dispatch(adapter: &dyn EngineAdapter,
                      op: OperationKind,
                      request: &GenerationRequest)
                      -> Result<EngineOutput, AdapterError> {
    if !adapter.descriptor().supports(op) {
        return Err(AdapterError::contract(format!("engine '{}' does not support {op}",
                                                  adapter.descriptor().engine_id())));
    }
    match op {
        OperationKind::GenerateImage => adapter.generate_image(request).await,
        OperationKind::GenerateVideo => adapter.generate_video(request).await,
        OperationKind::ApplyLipSync => adapter.apply_lip_sync(request).await,
        OperationKind::Upscale => adapter.upscale(request).await,
    }
}
