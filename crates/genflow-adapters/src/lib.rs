//! genflow-adapters: concrete `EngineAdapter` implementations.
//!
//! - `SyntheticLocalEngine`: free local engine with deterministic
//!   in-memory outputs; the default for demos and tests.
//! - `HttpJsonEngine`: generic remote JSON engine; one POST per
//!   operation, HTTP failures mapped onto the error taxonomy.
//! - `ScriptedEngine`: per-call programmable outcomes for orchestrator
//!   tests (fallback, timeout and safety-filter paths).

pub mod http;
pub mod local;
pub mod scripted;

pub use http::HttpJsonEngine;
pub use local::SyntheticLocalEngine;
pub use scripted::{ScriptedEngine, ScriptedOutcome};
