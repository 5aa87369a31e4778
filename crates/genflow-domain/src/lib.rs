//! genflow-domain: pure domain types for the generation pipeline.
//!
//! Role in the system:
//! - Operation/engine vocabulary shared by every crate.
//! - Workflow presets (declarative, versioned pipelines) and their
//!   publish-time validation.
//! - The error taxonomy every boundary speaks (codes + remediation).
//! - Credential material that redacts itself on the way out.
//!
//! Nothing in this crate performs IO or holds runtime state.

pub mod credentials;
pub mod error;
pub mod hashing;
pub mod operation;
pub mod preset;
pub mod quality;

pub use credentials::EngineCredentials;
pub use error::{DomainError, ErrorCode, ErrorInfo};
pub use operation::{EngineDescriptor, EngineKind, OperationKind};
pub use preset::{PresetStep, WorkflowPreset};
pub use quality::QualityLevel;
