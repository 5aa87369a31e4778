//! Artifacts: stored step outputs.
//!
//! An artifact is write-once and partitioned by job: nothing outside its
//! owning job mutates it, and it is never deleted while the job's
//! history is referenced (failed jobs keep their partial artifacts for
//! diagnostics). The ref is derived from a blake3 content hash scoped by
//! job and step, so it is stable for the life of the job's history.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use genflow_domain::hashing::hash_value;
use genflow_domain::OperationKind;

/// Content categories the pipeline moves between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Image,
    Video,
    Audio,
    Json,
}

impl ArtifactKind {
    /// What each operation produces.
    pub fn for_operation(op: OperationKind) -> Self {
        match op {
            OperationKind::GenerateImage => ArtifactKind::Image,
            OperationKind::GenerateVideo => ArtifactKind::Video,
            OperationKind::ApplyLipSync => ArtifactKind::Video,
            OperationKind::Upscale => ArtifactKind::Image,
        }
    }
}

/// Where the payload lives. Inline JSON for engine-returned documents,
/// a location string for file/object-store backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactLocation {
    Inline(Value),
    Path(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_ref: String,
    pub job_id: Uuid,
    pub step_id: String,
    pub kind: ArtifactKind,
    pub location: ArtifactLocation,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Auxiliary engine metadata; not part of the ref.
    pub metadata: Value,
}

/// Ref format: `job/<uuid>/<step>/<hash16>`. The hash prefix is enough
/// within a single job+step scope.
pub fn artifact_ref(job_id: Uuid, step_id: &str, payload: &Value) -> String {
    let h = hash_value(payload);
    format!("job/{job_id}/{step_id}/{}", &h[..16])
}

#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    #[error("io: {0}")]
    Io(String),
}

/// Pluggable artifact storage. The contract: `resolve` is only ever
/// called with a previously `save`d ref, and refs stay valid for the
/// owning job's history.
pub trait ArtifactStore: Send + Sync {
    fn save(&self,
            job_id: Uuid,
            step_id: &str,
            kind: ArtifactKind,
            payload: Value,
            metadata: Value)
            -> Result<Artifact, ArtifactStoreError>;

    fn resolve(&self, artifact_ref: &str) -> Option<Artifact>;

    fn list(&self, job_id: Uuid) -> Vec<Artifact>;
}

#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    by_ref: DashMap<String, Artifact>,
    by_job: DashMap<Uuid, Vec<String>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn save(&self,
            job_id: Uuid,
            step_id: &str,
            kind: ArtifactKind,
            payload: Value,
            metadata: Value)
            -> Result<Artifact, ArtifactStoreError> {
        let size_bytes = payload.to_string().len() as u64;
        let artifact = Artifact { artifact_ref: artifact_ref(job_id, step_id, &payload),
                                  job_id,
                                  step_id: step_id.to_string(),
                                  kind,
                                  location: ArtifactLocation::Inline(payload),
                                  size_bytes,
                                  created_at: Utc::now(),
                                  metadata };
        self.by_ref.insert(artifact.artifact_ref.clone(), artifact.clone());
        self.by_job.entry(job_id).or_default().push(artifact.artifact_ref.clone());
        Ok(artifact)
    }

    fn resolve(&self, artifact_ref: &str) -> Option<Artifact> {
        self.by_ref.get(artifact_ref).map(|a| a.clone())
    }

    fn list(&self, job_id: Uuid) -> Vec<Artifact> {
        let refs = self.by_job.get(&job_id).map(|r| r.clone()).unwrap_or_default();
        refs.iter().filter_map(|r| self.resolve(r)).collect()
    }
}
