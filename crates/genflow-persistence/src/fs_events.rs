//! JSONL event log on disk.
//!
//! Layout under the root directory:
//!
//! ```text
//! root/
//!   index.jsonl          # one JobIndexEntry per submitted job
//!   jobs/<job_id>.jsonl  # one JobEvent per line, ascending seq
//! ```
//!
//! Events are written with `serde_json` one object per line and never
//! rewritten. `seq` is assigned from an in-process counter seeded by
//! counting lines on first touch of a job file, so reopening a root
//! continues numbering where the previous process stopped.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use genflow_core::{EventStore, EventStoreError, JobEvent, JobEventKind, JobIndexEntry};

pub struct FsEventStore {
    root: PathBuf,
    // Guards all appends and the seq cache. Disk appends are rare
    // relative to engine calls, so one writer lock is enough.
    state: Mutex<HashMap<Uuid, u64>>,
}

fn io_err(e: std::io::Error) -> EventStoreError {
    EventStoreError::Io(e.to_string())
}

impl FsEventStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, EventStoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("jobs")).map_err(io_err)?;
        Ok(Self { root,
                  state: Mutex::new(HashMap::new()) })
    }

    fn job_path(&self, job_id: Uuid) -> PathBuf {
        self.root.join("jobs").join(format!("{job_id}.jsonl"))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.jsonl")
    }

    fn read_lines<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, EventStoreError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path).map_err(io_err)?;
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .map_err(|e| EventStoreError::Corrupt(format!("{}: {e}", path.display())))?;
            out.push(record);
        }
        Ok(out)
    }

    fn append_line<T: serde::Serialize>(path: &Path, record: &T) -> Result<(), EventStoreError> {
        let mut file = OpenOptions::new().create(true).append(true).open(path).map_err(io_err)?;
        let line = serde_json::to_string(record)
            .map_err(|e| EventStoreError::Corrupt(e.to_string()))?;
        writeln!(file, "{line}").map_err(io_err)
    }

    /// Seed the seq counter for a job not yet seen by this process.
    fn cold_next_seq(&self, job_id: Uuid) -> Result<u64, EventStoreError> {
        let events: Vec<JobEvent> = Self::read_lines(&self.job_path(job_id))?;
        Ok(events.last().map(|e| e.seq + 1).unwrap_or(0))
    }
}

impl EventStore for FsEventStore {
    fn append_kind(&self, job_id: Uuid, kind: JobEventKind) -> Result<JobEvent, EventStoreError> {
        let mut seqs = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let next = match seqs.get(&job_id) {
            Some(n) => *n,
            None => self.cold_next_seq(job_id)?,
        };
        let ev = JobEvent { seq: next,
                            job_id,
                            kind,
                            ts: Utc::now() };
        Self::append_line(&self.job_path(job_id), &ev)?;
        seqs.insert(job_id, next + 1);
        // Index only after the event line landed, so the index never
        // names a job whose log is empty.
        if let JobEventKind::JobSubmitted { account_id, .. } = &ev.kind {
            Self::append_line(&self.index_path(),
                              &JobIndexEntry { job_id,
                                               account_id: account_id.clone(),
                                               created_at: Utc::now() })?;
        }
        Ok(ev)
    }

    fn list(&self, job_id: Uuid) -> Result<Vec<JobEvent>, EventStoreError> {
        Self::read_lines(&self.job_path(job_id))
    }

    fn jobs_for_account(&self, account_id: &str) -> Result<Vec<JobIndexEntry>, EventStoreError> {
        let all: Vec<JobIndexEntry> = Self::read_lines(&self.index_path())?;
        let mut entries: Vec<JobIndexEntry> =
            all.into_iter().filter(|e| e.account_id == account_id).collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }
}
