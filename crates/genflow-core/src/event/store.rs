//! `EventStore` contract and the in-memory implementation.
//!
//! Unlike a single-threaded engine, workers append concurrently, so the
//! trait takes `&self` and implementations provide their own interior
//! mutability. Appends within one job are serialized by the store and
//! `seq` reflects that order.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use super::{JobEvent, JobEventKind};

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("io: {0}")]
    Io(String),
    #[error("corrupt event record: {0}")]
    Corrupt(String),
}

/// Entry of the account/date index backing "list jobs by account".
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JobIndexEntry {
    pub job_id: Uuid,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only event storage, one log per job.
pub trait EventStore: Send + Sync {
    /// Append an event from its kind and return the full event
    /// (with assigned seq and timestamp).
    fn append_kind(&self, job_id: Uuid, kind: JobEventKind) -> Result<JobEvent, EventStoreError>;

    /// All events of a job, ascending by seq. Empty for unknown jobs.
    fn list(&self, job_id: Uuid) -> Result<Vec<JobEvent>, EventStoreError>;

    /// Jobs known to this store, most recent first.
    fn jobs_for_account(&self, account_id: &str) -> Result<Vec<JobIndexEntry>, EventStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    logs: DashMap<Uuid, Vec<JobEvent>>,
    index: DashMap<String, Vec<JobIndexEntry>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append_kind(&self, job_id: Uuid, kind: JobEventKind) -> Result<JobEvent, EventStoreError> {
        // If this is the admission event, index the job for the account.
        if let JobEventKind::JobSubmitted { account_id, .. } = &kind {
            self.index
                .entry(account_id.clone())
                .or_default()
                .push(JobIndexEntry { job_id,
                                      account_id: account_id.clone(),
                                      created_at: Utc::now() });
        }
        let mut log = self.logs.entry(job_id).or_default();
        let ev = JobEvent { seq: log.len() as u64,
                            job_id,
                            kind,
                            ts: Utc::now() };
        log.push(ev.clone());
        Ok(ev)
    }

    fn list(&self, job_id: Uuid) -> Result<Vec<JobEvent>, EventStoreError> {
        Ok(self.logs.get(&job_id).map(|l| l.clone()).unwrap_or_default())
    }

    fn jobs_for_account(&self, account_id: &str) -> Result<Vec<JobIndexEntry>, EventStoreError> {
        let mut entries = self.index.get(account_id).map(|e| e.clone()).unwrap_or_default();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_follows_append_order_per_job() {
        let store = InMemoryEventStore::new();
        let job = Uuid::new_v4();
        let other = Uuid::new_v4();
        let a = store.append_kind(job, JobEventKind::JobStarted {}).unwrap();
        let b = store.append_kind(other, JobEventKind::JobStarted {}).unwrap();
        let c = store.append_kind(job, JobEventKind::JobCancelled {}).unwrap();
        assert_eq!((a.seq, b.seq, c.seq), (0, 0, 1));
        assert_eq!(store.list(job).unwrap().len(), 2);
    }

    #[test]
    fn submission_feeds_the_account_index() {
        let store = InMemoryEventStore::new();
        let job = Uuid::new_v4();
        store.append_kind(job,
                          JobEventKind::JobSubmitted { account_id: "acct".into(),
                                                       preset_id: "p".into(),
                                                       preset_version: 1,
                                                       definition_hash: "h".into(),
                                                       quality: genflow_domain::QualityLevel::Low,
                                                       estimated_cost: 0,
                                                       hold_tx: Uuid::new_v4(),
                                                       consent_given: false })
             .unwrap();
        let jobs = store.jobs_for_account("acct").unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, job);
        assert!(store.jobs_for_account("other").unwrap().is_empty());
    }
}
