//! Job records: the caller-facing view of one pipeline execution.
//!
//! A `PipelineJob` is never stored as a mutable master copy; it is the
//! replay of the job's event log (see `repo`). Terminal once status is
//! completed, failed or cancelled.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use genflow_domain::{ErrorInfo, QualityLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// Outcome of one step. Exists only once the step has started.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepResult {
    pub engine_used: Option<String>,
    pub artifact_refs: Vec<String>,
    pub cost: u64,
    pub attempts: u32,
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineJob {
    pub job_id: Uuid,
    pub account_id: String,
    pub preset_id: String,
    pub preset_version: u32,
    pub quality: QualityLevel,
    pub status: JobStatus,
    /// Insertion order = execution order; entries exist only for steps
    /// that have started.
    pub step_results: IndexMap<String, StepResult>,
    pub total_cost: u64,
    pub consent_given: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<ErrorInfo>,
}
