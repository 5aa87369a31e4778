//! Job reconstruction by replay.
//!
//! The repository consumes a job's events in seq order and folds them
//! into a `PipelineJob`. No mutable master record exists anywhere else,
//! so the log is the single source of truth and a job's exact timeline
//! can always be reproduced.

use uuid::Uuid;

use crate::event::{EventStore, EventStoreError, JobEvent, JobEventKind};
use crate::job::{JobStatus, PipelineJob, StepResult};

/// Fold an event list (ascending seq) into a job record. `None` when
/// the list is empty or lacks the admission event.
pub fn replay_job(events: &[JobEvent]) -> Option<PipelineJob> {
    let first = events.first()?;
    let JobEventKind::JobSubmitted { account_id,
                                     preset_id,
                                     preset_version,
                                     quality,
                                     consent_given,
                                     .. } = &first.kind
    else {
        return None;
    };

    let mut job = PipelineJob { job_id: first.job_id,
                                account_id: account_id.clone(),
                                preset_id: preset_id.clone(),
                                preset_version: *preset_version,
                                quality: *quality,
                                status: JobStatus::Queued,
                                step_results: Default::default(),
                                total_cost: 0,
                                consent_given: *consent_given,
                                created_at: first.ts,
                                started_at: None,
                                finished_at: None,
                                error: None };

    for ev in &events[1..] {
        match &ev.kind {
            JobEventKind::JobSubmitted { .. } => {}
            JobEventKind::JobStarted {} => {
                job.status = JobStatus::Running;
                job.started_at = Some(ev.ts);
            }
            JobEventKind::StepAttemptStarted { step_id, .. } => {
                let slot = job.step_results.entry(step_id.clone()).or_default();
                slot.attempts += 1;
            }
            JobEventKind::StepAttemptFailed { step_id, error, .. } => {
                // Last attempt error wins; cleared again if a fallback succeeds.
                let slot = job.step_results.entry(step_id.clone()).or_default();
                slot.error = Some(error.clone());
            }
            JobEventKind::StepFinished { step_id, engine_id, artifact_refs, cost } => {
                let slot = job.step_results.entry(step_id.clone()).or_default();
                slot.engine_used = Some(engine_id.clone());
                slot.artifact_refs = artifact_refs.clone();
                slot.cost = *cost;
                slot.error = None;
            }
            JobEventKind::StepFailed { step_id, error } => {
                let slot = job.step_results.entry(step_id.clone()).or_default();
                slot.error = Some(error.clone());
            }
            JobEventKind::JobCompleted { total_cost } => {
                job.status = JobStatus::Completed;
                job.total_cost = *total_cost;
                job.finished_at = Some(ev.ts);
            }
            JobEventKind::JobFailed { error } => {
                job.status = JobStatus::Failed;
                job.total_cost = job.step_results.values().map(|s| s.cost).sum();
                job.error = Some(error.clone());
                job.finished_at = Some(ev.ts);
            }
            JobEventKind::JobCancelled {} => {
                job.status = JobStatus::Cancelled;
                job.total_cost = job.step_results.values().map(|s| s.cost).sum();
                job.finished_at = Some(ev.ts);
            }
        }
    }
    Some(job)
}

/// Load jobs from an event store by replay.
pub trait JobRepository: Send + Sync {
    fn load(&self, store: &dyn EventStore, job_id: Uuid) -> Result<Option<PipelineJob>, EventStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryJobRepository;

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self
    }
}

impl JobRepository for InMemoryJobRepository {
    fn load(&self, store: &dyn EventStore, job_id: Uuid) -> Result<Option<PipelineJob>, EventStoreError> {
        let events = store.list(job_id)?;
        Ok(replay_job(&events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InMemoryEventStore;
    use genflow_domain::{ErrorCode, ErrorInfo, QualityLevel};

    fn submitted(store: &InMemoryEventStore, job: Uuid) {
        store.append_kind(job,
                          JobEventKind::JobSubmitted { account_id: "acct".into(),
                                                       preset_id: "p".into(),
                                                       preset_version: 1,
                                                       definition_hash: "h".into(),
                                                       quality: QualityLevel::Standard,
                                                       estimated_cost: 16,
                                                       hold_tx: Uuid::new_v4(),
                                                       consent_given: true })
             .unwrap();
    }

    #[test]
    fn replay_reconstructs_a_completed_job() {
        let store = InMemoryEventStore::new();
        let job = Uuid::new_v4();
        submitted(&store, job);
        store.append_kind(job, JobEventKind::JobStarted {}).unwrap();
        store.append_kind(job, JobEventKind::StepAttemptStarted { step_id: "image".into(),
                                                                  engine_id: "e1".into(),
                                                                  attempt: 1 }).unwrap();
        store.append_kind(job, JobEventKind::StepFinished { step_id: "image".into(),
                                                            engine_id: "e1".into(),
                                                            artifact_refs: vec!["r1".into()],
                                                            cost: 10 }).unwrap();
        store.append_kind(job, JobEventKind::JobCompleted { total_cost: 10 }).unwrap();

        let rec = replay_job(&store.list(job).unwrap()).unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert_eq!(rec.total_cost, 10);
        assert_eq!(rec.step_results["image"].artifact_refs, vec!["r1"]);
        assert_eq!(rec.step_results["image"].attempts, 1);
        assert!(rec.started_at.is_some() && rec.finished_at.is_some());
    }

    #[test]
    fn fallback_success_clears_the_attempt_error() {
        let store = InMemoryEventStore::new();
        let job = Uuid::new_v4();
        submitted(&store, job);
        store.append_kind(job, JobEventKind::JobStarted {}).unwrap();
        store.append_kind(job, JobEventKind::StepAttemptStarted { step_id: "s".into(),
                                                                  engine_id: "a".into(),
                                                                  attempt: 1 }).unwrap();
        store.append_kind(job, JobEventKind::StepAttemptFailed {
                              step_id: "s".into(),
                              engine_id: "a".into(),
                              attempt: 1,
                              error: ErrorInfo::new(ErrorCode::EngineOffline, "down"),
                              retryable: true }).unwrap();
        store.append_kind(job, JobEventKind::StepAttemptStarted { step_id: "s".into(),
                                                                  engine_id: "b".into(),
                                                                  attempt: 2 }).unwrap();
        store.append_kind(job, JobEventKind::StepFinished { step_id: "s".into(),
                                                            engine_id: "b".into(),
                                                            artifact_refs: vec!["r".into()],
                                                            cost: 5 }).unwrap();
        store.append_kind(job, JobEventKind::JobCompleted { total_cost: 5 }).unwrap();

        let rec = replay_job(&store.list(job).unwrap()).unwrap();
        let slot = &rec.step_results["s"];
        assert_eq!(slot.attempts, 2);
        assert_eq!(slot.engine_used.as_deref(), Some("b"));
        assert!(slot.error.is_none());
    }

    #[test]
    fn replay_without_admission_event_is_none() {
        let store = InMemoryEventStore::new();
        let job = Uuid::new_v4();
        store.append_kind(job, JobEventKind::JobStarted {}).unwrap();
        assert!(replay_job(&store.list(job).unwrap()).is_none());
    }
}
