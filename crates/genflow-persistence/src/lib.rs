//! genflow-persistence
//!
//! Filesystem-backed implementations of the core storage contracts:
//! - `FsEventStore`: one append-only JSONL log per job plus an
//!   `index.jsonl` of (job_id, account_id, created_at) entries, so the
//!   whole history survives a restart and a job can be rehydrated by
//!   replaying its file.
//! - `FsArtifactStore`: one JSON document per artifact, partitioned by
//!   job directory, refs resolved by path derivation.
//!
//! Both implement the `&self` contracts from genflow-core and serialize
//! writers with a store-level mutex; within one process that is the
//! same ordering guarantee the in-memory stores give.

pub mod fs_artifacts;
pub mod fs_events;

pub use fs_artifacts::FsArtifactStore;
pub use fs_events::FsEventStore;
