//! Core orchestrator errors.
//!
//! `CoreError::Rejected` carries a taxonomy `ErrorInfo` and is the
//! normal shape for foreseeable failures; `Internal` and `Store` are the
//! only genuinely exceptional variants.

use thiserror::Error;

use genflow_domain::{ErrorCode, ErrorInfo};

use crate::event::EventStoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A foreseeable, remediable failure (see the taxonomy).
    #[error("{0}")]
    Rejected(ErrorInfo),
    #[error("event store: {0}")]
    Store(#[from] EventStoreError),
    #[error("internal: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        CoreError::Rejected(ErrorInfo::new(code, message))
    }

    /// The taxonomy info when this is a rejection.
    pub fn info(&self) -> Option<&ErrorInfo> {
        match self {
            CoreError::Rejected(info) => Some(info),
            _ => None,
        }
    }
}
