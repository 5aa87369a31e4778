//! genflow-core: the multi-engine pipeline orchestrator.
//!
//! Role in the system:
//! - Every job mutation is an event appended to an `EventStore`; the
//!   job record is a pure replay of its events (no mutable master copy).
//! - `PipelineManager` admits jobs (validation, consent, credit hold),
//!   a bounded worker pool executes steps in dependency order against
//!   engines resolved through the `ProviderRegistry`, and the
//!   `CreditLedger` is settled on every terminal transition.
//! - Foreseeable failures are values (`ErrorInfo`), never panics.

pub mod adapter;
pub mod artifact;
pub mod catalog;
pub mod errors;
pub mod event;
pub mod inputs;
pub mod job;
pub mod ledger;
pub mod manager;
pub mod registry;
pub mod repo;

pub use adapter::{AdapterError, EngineAdapter, EngineBalance, EngineOutput, GenerationRequest};
pub use artifact::{artifact_ref, Artifact, ArtifactKind, ArtifactLocation, ArtifactStore,
                   ArtifactStoreError, InMemoryArtifactStore};
pub use catalog::PresetCatalog;
pub use errors::CoreError;
pub use event::{EventStore, EventStoreError, InMemoryEventStore, JobEvent, JobEventKind, JobIndexEntry};
pub use job::{JobStatus, PipelineJob, StepResult};
pub use ledger::{CreditLedger, CreditTransaction, SettleOutcome, TxKind};
pub use manager::{JobStatusResponse, PipelineManager, RegisterResponse, SubmitRequest, SubmitResponse};
pub use registry::{ProviderRegistry, ProviderStatus, ProviderView};
pub use repo::{replay_job, InMemoryJobRepository, JobRepository};
