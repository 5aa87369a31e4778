//! Error taxonomy shared across the pipeline.
//!
//! Every foreseeable failure crossing a component boundary is reduced to
//! one of these codes before it reaches a caller. Codes travel inside
//! events and responses, so they are serde-derivable (same contract as
//! the rest of the event log).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable failure codes. The orchestrator decides retry/fallback/abort
/// from the code alone, never from message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Adapter unreachable or its backend not running.
    EngineOffline,
    /// Adapter call exceeded its deadline.
    EngineTimeout,
    /// Required extension/model absent on the engine side.
    DependencyMissing,
    /// Ledger hold failed, or the provider's own balance is too low.
    InsufficientFunds,
    /// Identity-bearing step requested without the consent flag.
    ConsentMissing,
    /// Malformed preset or request.
    ValidationError,
    /// Request/response shape disagreement at a provider boundary.
    ContractMismatch,
    /// Provider rejected the content itself.
    SafetyFilter,
    /// Referenced input or artifact missing.
    FileNotFound,
    /// Integrity check failed on a fetched dependency.
    ChecksumMismatch,
}

impl ErrorCode {
    /// Transient engine-side failures are worth a fallback candidate.
    /// Everything else means the request itself is unsound.
    pub fn retryable(self) -> bool {
        matches!(self,
                 ErrorCode::EngineOffline | ErrorCode::EngineTimeout | ErrorCode::InsufficientFunds)
    }

    /// Default remediation hints for this code. Presets may append their
    /// own hints on top (see `WorkflowPreset::failure_hints`).
    pub fn remediation(self) -> Vec<String> {
        let hints: &[&str] = match self {
            ErrorCode::EngineOffline => &["check that the engine process or service is running",
                                          "configure a fallback engine for this step"],
            ErrorCode::EngineTimeout => &["retry the job", "raise the per-call timeout for this engine"],
            ErrorCode::DependencyMissing => &["install the missing model or extension on the engine"],
            ErrorCode::InsufficientFunds => &["add funds to the account", "use a free local engine"],
            ErrorCode::ConsentMissing => &["resubmit with consent_given=true after obtaining consent"],
            ErrorCode::ValidationError => &["fix the request or preset and resubmit"],
            ErrorCode::ContractMismatch => &["update the adapter to match the provider API version"],
            ErrorCode::SafetyFilter => &["adjust the prompt or inputs", "try a different engine"],
            ErrorCode::FileNotFound => &["check that the referenced input or artifact exists"],
            ErrorCode::ChecksumMismatch => &["re-download the dependency and verify its checksum"],
        };
        hints.iter().map(|s| s.to_string()).collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::EngineOffline => "ENGINE_OFFLINE",
            ErrorCode::EngineTimeout => "ENGINE_TIMEOUT",
            ErrorCode::DependencyMissing => "DEPENDENCY_MISSING",
            ErrorCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorCode::ConsentMissing => "CONSENT_MISSING",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::ContractMismatch => "CONTRACT_MISMATCH",
            ErrorCode::SafetyFilter => "SAFETY_FILTER",
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
            ErrorCode::ChecksumMismatch => "CHECKSUM_MISMATCH",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-exceptional error value surfaced to callers: code, human message
/// and a concrete list of next actions. Secrets are redacted before an
/// `ErrorInfo` is ever built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    pub remediation: Vec<String>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code,
               message: message.into(),
               remediation: code.remediation() }
    }

    /// Append preset-supplied hints after the defaults.
    pub fn with_hints(mut self, hints: &[String]) -> Self {
        self.remediation.extend(hints.iter().cloned());
        self
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Errors raised by domain-level validation.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("cycle in depends_on: {0}")]
    CyclicDependency(String),
}

impl DomainError {
    /// All domain validation failures map to `VALIDATION_ERROR`.
    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo::new(ErrorCode::ValidationError, self.to_string())
    }
}
