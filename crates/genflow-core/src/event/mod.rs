//! Append-only job event log.

pub mod store;
pub mod types;

pub use store::{EventStore, EventStoreError, InMemoryEventStore, JobIndexEntry};
pub use types::{JobEvent, JobEventKind};
