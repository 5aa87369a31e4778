//! Preset catalog: published presets keyed by `(id, version)`.
//!
//! Presets validate at publish time and are immutable afterwards; a new
//! version is a new entry, so jobs referencing an older version keep
//! their definition for their whole lifetime.

use std::sync::Arc;

use dashmap::DashMap;

use genflow_domain::{DomainError, WorkflowPreset};

#[derive(Default)]
pub struct PresetCatalog {
    presets: DashMap<(String, u32), Arc<WorkflowPreset>>,
}

impl PresetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a validated preset. Re-publishing an existing
    /// `(id, version)` is a validation error; bump the version instead.
    pub fn publish(&self, preset: WorkflowPreset) -> Result<Arc<WorkflowPreset>, DomainError> {
        let key = (preset.id().to_string(), preset.version());
        if self.presets.contains_key(&key) {
            return Err(DomainError::Validation(format!(
                "preset '{}' version {} already published; publish a new version", key.0, key.1
            )));
        }
        let arc = Arc::new(preset);
        self.presets.insert(key, Arc::clone(&arc));
        Ok(arc)
    }

    pub fn get(&self, id: &str, version: u32) -> Option<Arc<WorkflowPreset>> {
        self.presets.get(&(id.to_string(), version)).map(|p| Arc::clone(&p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genflow_domain::{OperationKind, PresetStep, QualityLevel};
    use indexmap::IndexMap;

    fn preset(version: u32) -> WorkflowPreset {
        WorkflowPreset::publish("p", version, &[], &[],
                                vec![PresetStep::new("s", OperationKind::GenerateImage, &["e"])],
                                &[QualityLevel::Low], false, IndexMap::new()).unwrap()
    }

    #[test]
    fn versions_are_distinct_entries() {
        let catalog = PresetCatalog::new();
        catalog.publish(preset(1)).unwrap();
        catalog.publish(preset(2)).unwrap();
        assert!(catalog.get("p", 1).is_some());
        assert!(catalog.get("p", 2).is_some());
        assert!(catalog.get("p", 3).is_none());
    }

    #[test]
    fn republishing_a_version_is_rejected() {
        let catalog = PresetCatalog::new();
        catalog.publish(preset(1)).unwrap();
        assert!(catalog.publish(preset(1)).is_err());
    }
}
