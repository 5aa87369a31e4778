//! Engine/operation vocabulary.
//!
//! An engine is an opaque generation backend (local process or remote
//! paid API). Its descriptor is immutable once registered; capability
//! questions are answered from `supported_operations`, never by
//! type-switching on the concrete adapter.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Generation operations the uniform adapter interface supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    GenerateImage,
    GenerateVideo,
    ApplyLipSync,
    Upscale,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::GenerateImage => write!(f, "generate_image"),
            OperationKind::GenerateVideo => write!(f, "generate_video"),
            OperationKind::ApplyLipSync => write!(f, "apply_lip_sync"),
            OperationKind::Upscale => write!(f, "upscale"),
        }
    }
}

/// Where the engine's compute lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Local,
    Remote,
}

/// Immutable identity card of one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDescriptor {
    engine_id: String,
    kind: EngineKind,
    supported_operations: BTreeSet<OperationKind>,
}

impl EngineDescriptor {
    pub fn new(engine_id: impl Into<String>,
               kind: EngineKind,
               operations: impl IntoIterator<Item = OperationKind>)
               -> Self {
        Self { engine_id: engine_id.into(),
               kind,
               supported_operations: operations.into_iter().collect() }
    }

    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn supports(&self, op: OperationKind) -> bool {
        self.supported_operations.contains(&op)
    }

    pub fn supported_operations(&self) -> impl Iterator<Item = OperationKind> + '_ {
        self.supported_operations.iter().copied()
    }
}
