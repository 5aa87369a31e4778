use genflow_core::{EventStore, JobEventKind};
use genflow_domain::{ErrorCode, ErrorInfo, QualityLevel};
use genflow_persistence::FsEventStore;
use uuid::Uuid;

fn submitted(account: &str) -> JobEventKind {
    JobEventKind::JobSubmitted { account_id: account.to_string(),
                                 preset_id: "image-then-upscale".to_string(),
                                 preset_version: 1,
                                 definition_hash: "abc123".to_string(),
                                 quality: QualityLevel::Standard,
                                 estimated_cost: 12,
                                 hold_tx: Uuid::new_v4(),
                                 consent_given: false }
}

// Every event kind written to disk must come back structurally intact,
// including the nested ErrorInfo on failures.
#[test]
fn events_survive_a_disk_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsEventStore::open(dir.path()).unwrap();
    let job = Uuid::new_v4();

    store.append_kind(job, submitted("acct-1")).unwrap();
    store.append_kind(job, JobEventKind::JobStarted {}).unwrap();
    store.append_kind(job,
                      JobEventKind::StepAttemptStarted { step_id: "image".into(),
                                                         engine_id: "local".into(),
                                                         attempt: 0 })
         .unwrap();
    store.append_kind(job,
                      JobEventKind::StepAttemptFailed {
                          step_id: "image".into(),
                          engine_id: "local".into(),
                          attempt: 0,
                          error: ErrorInfo::new(ErrorCode::EngineTimeout, "gave up after 30s"),
                          retryable: true,
                      })
         .unwrap();
    store.append_kind(job,
                      JobEventKind::StepFinished { step_id: "image".into(),
                                                   engine_id: "fallback".into(),
                                                   artifact_refs: vec!["job/x/image/abcd".into()],
                                                   cost: 5 })
         .unwrap();
    store.append_kind(job, JobEventKind::JobCompleted { total_cost: 5 }).unwrap();

    let events = store.list(job).unwrap();
    assert_eq!(events.len(), 6);
    match &events[3].kind {
        JobEventKind::StepAttemptFailed { error, retryable, .. } => {
            assert_eq!(error.code, ErrorCode::EngineTimeout);
            assert!(*retryable);
        }
        other => panic!("expected StepAttemptFailed, got {other:?}"),
    }
    assert!(events[5].kind.is_terminal());
}

#[test]
fn seq_is_contiguous_per_job() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsEventStore::open(dir.path()).unwrap();
    let job = Uuid::new_v4();
    let other = Uuid::new_v4();

    for i in 0..4u32 {
        store.append_kind(job,
                          JobEventKind::StepAttemptStarted { step_id: format!("s{i}"),
                                                             engine_id: "local".into(),
                                                             attempt: 0 })
             .unwrap();
    }
    store.append_kind(other, JobEventKind::JobStarted {}).unwrap();

    let events = store.list(job).unwrap();
    for (expected, ev) in (0u64..).zip(events.iter()) {
        assert_eq!(ev.seq, expected);
    }
    assert_eq!(store.list(other).unwrap()[0].seq, 0);
}

// Dropping the store and reopening the same root must continue seq
// numbering instead of restarting at zero.
#[test]
fn reopen_continues_sequence_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let job = Uuid::new_v4();
    {
        let store = FsEventStore::open(dir.path()).unwrap();
        store.append_kind(job, submitted("acct-1")).unwrap();
        store.append_kind(job, JobEventKind::JobStarted {}).unwrap();
    }
    let store = FsEventStore::open(dir.path()).unwrap();
    let ev = store.append_kind(job, JobEventKind::JobCancelled {}).unwrap();
    assert_eq!(ev.seq, 2);
    assert_eq!(store.list(job).unwrap().len(), 3);
}

#[test]
fn account_index_filters_and_orders_by_recency() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsEventStore::open(dir.path()).unwrap();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let foreign = Uuid::new_v4();

    store.append_kind(first, submitted("acct-1")).unwrap();
    store.append_kind(second, submitted("acct-1")).unwrap();
    store.append_kind(foreign, submitted("acct-2")).unwrap();

    let jobs = store.jobs_for_account("acct-1").unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.account_id == "acct-1"));
    assert!(jobs[0].created_at >= jobs[1].created_at);
    assert!(store.jobs_for_account("nobody").unwrap().is_empty());
}

// A submission whose event line cannot be written must not leave a
// ghost entry in the account index.
#[test]
fn failed_submission_append_leaves_no_index_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsEventStore::open(dir.path()).unwrap();
    let job = Uuid::new_v4();
    store.append_kind(job, JobEventKind::JobStarted {}).unwrap();

    // A directory squatting on the log path makes the next append fail
    // while the index file itself stays writable.
    let log = dir.path().join("jobs").join(format!("{job}.jsonl"));
    std::fs::remove_file(&log).unwrap();
    std::fs::create_dir(&log).unwrap();

    assert!(store.append_kind(job, submitted("acct-1")).is_err());
    assert!(store.jobs_for_account("acct-1").unwrap().is_empty());
}

#[test]
fn unknown_job_lists_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsEventStore::open(dir.path()).unwrap();
    assert!(store.list(Uuid::new_v4()).unwrap().is_empty());
}
