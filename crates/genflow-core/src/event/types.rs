//! Job event kinds and the `JobEvent` envelope.
//!
//! Role in the flow:
//! - `PipelineManager` emits one event per observable job transition to
//!   an append-only `EventStore`.
//! - The job record (`PipelineJob`) is reconstructed by replaying these
//!   events, so the log alone is enough to audit a job's exact timeline,
//!   including every failed engine attempt.
//! - The enum is the stable observable contract of the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use genflow_domain::{ErrorInfo, QualityLevel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEventKind {
    /// Admission record. Invariant: must be the first event of a job_id.
    /// Consent and funds were verified before this event exists.
    JobSubmitted {
        account_id: String,
        preset_id: String,
        preset_version: u32,
        definition_hash: String,
        quality: QualityLevel,
        estimated_cost: u64,
        hold_tx: Uuid,
        consent_given: bool,
    },
    /// A worker picked the job up.
    JobStarted {},
    /// One attempt against one candidate engine began.
    StepAttemptStarted { step_id: String, engine_id: String, attempt: u32 },
    /// A retryable attempt failed; the next candidate (if any) follows.
    /// A failed attempt never carries a debit.
    StepAttemptFailed {
        step_id: String,
        engine_id: String,
        attempt: u32,
        error: ErrorInfo,
        retryable: bool,
    },
    /// The step completed on `engine_id`; artifacts stored, cost metered.
    StepFinished {
        step_id: String,
        engine_id: String,
        artifact_refs: Vec<String>,
        cost: u64,
    },
    /// The step exhausted its candidates or hit a non-retryable failure.
    StepFailed { step_id: String, error: ErrorInfo },
    /// Terminal: all steps succeeded, ledger settled.
    JobCompleted { total_cost: u64 },
    /// Terminal: job aborted; earlier artifacts are retained.
    JobFailed { error: ErrorInfo },
    /// Terminal: caller-initiated cooperative cancellation.
    JobCancelled {},
}

impl JobEventKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self,
                 JobEventKind::JobCompleted { .. }
                 | JobEventKind::JobFailed { .. }
                 | JobEventKind::JobCancelled {})
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Assigned by the EventStore; append order within the job.
    pub seq: u64,
    pub job_id: Uuid,
    pub kind: JobEventKind,
    pub ts: DateTime<Utc>,
}
