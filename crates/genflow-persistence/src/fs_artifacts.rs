//! Artifact documents on disk, one JSON file per artifact.
//!
//! Layout: `root/<job_id>/<step_id>-<hash16>.json`, where the file name
//! components come straight from the artifact ref
//! (`job/<uuid>/<step>/<hash16>`), so resolution is pure path
//! derivation and needs no index file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use genflow_core::{artifact_ref, Artifact, ArtifactKind, ArtifactLocation, ArtifactStore,
                   ArtifactStoreError};
use serde_json::Value;

pub struct FsArtifactStore {
    root: PathBuf,
}

fn io_err(e: std::io::Error) -> ArtifactStoreError {
    ArtifactStoreError::Io(e.to_string())
}

impl FsArtifactStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, ArtifactStoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(io_err)?;
        Ok(Self { root })
    }

    fn path_for(&self, job_id: Uuid, step_id: &str, hash16: &str) -> PathBuf {
        self.root.join(job_id.to_string()).join(format!("{step_id}-{hash16}.json"))
    }

    /// Split a `job/<uuid>/<step>/<hash16>` ref into its components.
    fn parse_ref(artifact_ref: &str) -> Option<(Uuid, &str, &str)> {
        let mut parts = artifact_ref.splitn(4, '/');
        if parts.next() != Some("job") {
            return None;
        }
        let job_id: Uuid = parts.next()?.parse().ok()?;
        let step_id = parts.next()?;
        let hash16 = parts.next()?;
        Some((job_id, step_id, hash16))
    }

    fn read_doc(path: &Path) -> Option<Artifact> {
        let file = File::open(path).ok()?;
        serde_json::from_reader(BufReader::new(file)).ok()
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(&self,
            job_id: Uuid,
            step_id: &str,
            kind: ArtifactKind,
            payload: Value,
            metadata: Value)
            -> Result<Artifact, ArtifactStoreError> {
        let r = artifact_ref(job_id, step_id, &payload);
        let size_bytes = payload.to_string().len() as u64;
        let path = match Self::parse_ref(&r) {
            Some((job, step, hash)) => self.path_for(job, step, hash),
            None => return Err(ArtifactStoreError::Io(format!("malformed ref {r}"))),
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let artifact = Artifact { artifact_ref: r,
                                  job_id,
                                  step_id: step_id.to_string(),
                                  kind,
                                  location: ArtifactLocation::Inline(payload),
                                  size_bytes,
                                  created_at: chrono::Utc::now(),
                                  metadata };
        let file = File::create(&path).map_err(io_err)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &artifact)
            .map_err(|e| ArtifactStoreError::Io(e.to_string()))?;
        Ok(artifact)
    }

    fn resolve(&self, artifact_ref: &str) -> Option<Artifact> {
        let (job_id, step_id, hash16) = Self::parse_ref(artifact_ref)?;
        Self::read_doc(&self.path_for(job_id, step_id, hash16))
    }

    fn list(&self, job_id: Uuid) -> Vec<Artifact> {
        let dir = self.root.join(job_id.to_string());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut out: Vec<Artifact> =
            entries.filter_map(|e| e.ok()).filter_map(|e| Self::read_doc(&e.path())).collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }
}
