//! Workflow presets: declarative, versioned pipeline definitions.
//!
//! Role in the system:
//! - A preset names its inputs, its steps (operation + ordered engine
//!   candidates + dependencies) and its consent requirements.
//! - Published presets are immutable; a change is a new `(id, version)`
//!   pair, so an in-flight job always references a stable definition.
//! - `WorkflowPreset::publish` runs every structural validation; an
//!   instance that exists has already passed them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::DomainError;
use crate::hashing::{hash_str, to_canonical_json};
use crate::operation::OperationKind;
use crate::quality::QualityLevel;

/// One pipeline step inside a preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetStep {
    pub step_id: String,
    pub operation: OperationKind,
    /// Ordered fallback list; the orchestrator tries candidates in order.
    pub engine_candidates: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Input names that are identity references (a real person's face or
    /// voice). Any step carrying one forces `requires_consent` on the
    /// preset.
    #[serde(default)]
    pub identity_inputs: Vec<String>,
    /// Step-local defaults merged under the caller's inputs.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl PresetStep {
    pub fn new(step_id: impl Into<String>, operation: OperationKind, candidates: &[&str]) -> Self {
        Self { step_id: step_id.into(),
               operation,
               engine_candidates: candidates.iter().map(|s| s.to_string()).collect(),
               depends_on: Vec::new(),
               identity_inputs: Vec::new(),
               params: serde_json::Value::Null }
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn identity_inputs(mut self, inputs: &[&str]) -> Self {
        self.identity_inputs = inputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// Immutable, validated pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPreset {
    id: String,
    version: u32,
    required_inputs: Vec<String>,
    optional_inputs: Vec<String>,
    steps: Vec<PresetStep>,
    quality_tiers: Vec<QualityLevel>,
    requires_consent: bool,
    /// Extra remediation hints per error code, appended after defaults.
    failure_hints: IndexMap<String, Vec<String>>,
    definition_hash: String,
}

impl WorkflowPreset {
    /// Validate and publish a preset. Structural rules:
    /// - at least one step, each with at least one engine candidate;
    /// - step ids unique;
    /// - every `depends_on` entry names an existing step;
    /// - the dependency graph is a DAG (cycles reported deterministically);
    /// - `requires_consent` is set whenever any step has identity inputs.
    #[allow(clippy::too_many_arguments)]
    pub fn publish(id: impl Into<String>,
                   version: u32,
                   required_inputs: &[&str],
                   optional_inputs: &[&str],
                   steps: Vec<PresetStep>,
                   quality_tiers: &[QualityLevel],
                   requires_consent: bool,
                   failure_hints: IndexMap<String, Vec<String>>)
                   -> Result<Self, DomainError> {
        let id = id.into();
        if steps.is_empty() {
            return Err(DomainError::Validation(format!("preset '{id}' has no steps")));
        }
        if quality_tiers.is_empty() {
            return Err(DomainError::Validation(format!("preset '{id}' declares no quality tiers")));
        }

        let mut seen = std::collections::BTreeSet::new();
        for step in &steps {
            if !seen.insert(step.step_id.as_str()) {
                return Err(DomainError::Validation(format!("duplicate step id '{}'", step.step_id)));
            }
            if step.engine_candidates.is_empty() {
                return Err(DomainError::Validation(format!("step '{}' has no engine candidates", step.step_id)));
            }
            for dep in &step.depends_on {
                if !steps.iter().any(|s| &s.step_id == dep) {
                    return Err(DomainError::Validation(format!("step '{}' depends on unknown step '{}'",
                                                               step.step_id, dep)));
                }
            }
        }

        let has_identity = steps.iter().any(|s| !s.identity_inputs.is_empty());
        if has_identity && !requires_consent {
            return Err(DomainError::Validation(format!(
                "preset '{id}' has identity-referencing inputs but requires_consent is false"
            )));
        }

        let mut preset = Self { id,
                                version,
                                required_inputs: required_inputs.iter().map(|s| s.to_string()).collect(),
                                optional_inputs: optional_inputs.iter().map(|s| s.to_string()).collect(),
                                steps,
                                quality_tiers: quality_tiers.to_vec(),
                                requires_consent,
                                failure_hints,
                                definition_hash: String::new() };
        // Rejects cycles; order itself is recomputed on demand.
        preset.topological_order()?;
        preset.definition_hash = preset.compute_definition_hash();
        Ok(preset)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn required_inputs(&self) -> &[String] {
        &self.required_inputs
    }

    pub fn optional_inputs(&self) -> &[String] {
        &self.optional_inputs
    }

    pub fn steps(&self) -> &[PresetStep] {
        &self.steps
    }

    pub fn step(&self, step_id: &str) -> Option<&PresetStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn quality_tiers(&self) -> &[QualityLevel] {
        &self.quality_tiers
    }

    pub fn supports_quality(&self, quality: QualityLevel) -> bool {
        self.quality_tiers.contains(&quality)
    }

    pub fn requires_consent(&self) -> bool {
        self.requires_consent
    }

    pub fn definition_hash(&self) -> &str {
        &self.definition_hash
    }

    /// Extra hints the preset author recorded for a given code.
    pub fn hints_for(&self, code: &str) -> &[String] {
        self.failure_hints.get(code).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Kahn's algorithm over `depends_on`. Deterministic: ready steps are
    /// taken in declaration order, and a cycle is reported as the sorted
    /// list of step ids left in it.
    pub fn topological_order(&self) -> Result<Vec<String>, DomainError> {
        let n = self.steps.len();
        let index_of: std::collections::HashMap<&str, usize> =
            self.steps.iter().enumerate().map(|(i, s)| (s.step_id.as_str(), i)).collect();

        let mut indegree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, step) in self.steps.iter().enumerate() {
            for dep in &step.depends_on {
                let d = index_of[dep.as_str()];
                indegree[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut order = Vec::with_capacity(n);
        let mut ready: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        while let Some(i) = ready.first().copied() {
            ready.remove(0);
            order.push(self.steps[i].step_id.clone());
            for &j in &dependents[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    // Keep declaration order for determinism.
                    let pos = ready.iter().position(|&r| r > j).unwrap_or(ready.len());
                    ready.insert(pos, j);
                }
            }
        }

        if order.len() < n {
            let mut stuck: Vec<&str> = self.steps
                                           .iter()
                                           .filter(|s| !order.contains(&s.step_id))
                                           .map(|s| s.step_id.as_str())
                                           .collect();
            stuck.sort_unstable();
            return Err(DomainError::CyclicDependency(stuck.join(", ")));
        }
        Ok(order)
    }

    fn compute_definition_hash(&self) -> String {
        let steps: Vec<serde_json::Value> =
            self.steps
                .iter()
                .map(|s| {
                    json!({
                        "step_id": s.step_id,
                        "operation": s.operation,
                        "engine_candidates": s.engine_candidates,
                        "depends_on": s.depends_on,
                        "identity_inputs": s.identity_inputs,
                        "params": s.params,
                    })
                })
                .collect();
        let doc = json!({
            "id": self.id,
            "version": self.version,
            "required_inputs": self.required_inputs,
            "steps": steps,
            "requires_consent": self.requires_consent,
        });
        hash_str(&to_canonical_json(&doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step() -> Vec<PresetStep> {
        vec![PresetStep::new("image", OperationKind::GenerateImage, &["local-sd"]),
             PresetStep::new("upscale", OperationKind::Upscale, &["esrgan"]).depends_on(&["image"])]
    }

    #[test]
    fn publish_accepts_a_linear_pipeline() {
        let p = WorkflowPreset::publish("img-up", 1, &["prompt"], &[], two_step(),
                                        &[QualityLevel::Standard], false, IndexMap::new()).unwrap();
        assert_eq!(p.topological_order().unwrap(), vec!["image", "upscale"]);
        assert!(!p.definition_hash().is_empty());
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let steps = vec![PresetStep::new("a", OperationKind::GenerateImage, &["e"]).depends_on(&["ghost"])];
        let err = WorkflowPreset::publish("p", 1, &[], &[], steps, &[QualityLevel::Low], false,
                                          IndexMap::new()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn cycle_is_rejected_deterministically() {
        let steps = vec![PresetStep::new("a", OperationKind::GenerateImage, &["e"]).depends_on(&["b"]),
                         PresetStep::new("b", OperationKind::Upscale, &["e"]).depends_on(&["a"])];
        let e1 = WorkflowPreset::publish("p", 1, &[], &[], steps.clone(), &[QualityLevel::Low], false,
                                         IndexMap::new()).unwrap_err();
        let e2 = WorkflowPreset::publish("p", 1, &[], &[], steps, &[QualityLevel::Low], false,
                                         IndexMap::new()).unwrap_err();
        assert_eq!(e1, e2);
        assert!(matches!(e1, DomainError::CyclicDependency(ref ids) if ids == "a, b"));
    }

    #[test]
    fn identity_inputs_force_consent() {
        let steps = vec![PresetStep::new("sync", OperationKind::ApplyLipSync, &["wav2lip"])
                             .identity_inputs(&["face_ref"])];
        let err = WorkflowPreset::publish("lipsync", 1, &["face_ref"], &[], steps.clone(),
                                          &[QualityLevel::Standard], false, IndexMap::new()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let ok = WorkflowPreset::publish("lipsync", 1, &["face_ref"], &[], steps,
                                         &[QualityLevel::Standard], true, IndexMap::new());
        assert!(ok.is_ok());
    }

    #[test]
    fn definition_hash_changes_with_version() {
        let a = WorkflowPreset::publish("p", 1, &[], &[], two_step(), &[QualityLevel::Low], false,
                                        IndexMap::new()).unwrap();
        let b = WorkflowPreset::publish("p", 2, &[], &[], two_step(), &[QualityLevel::Low], false,
                                        IndexMap::new()).unwrap();
        assert_ne!(a.definition_hash(), b.definition_hash());
    }

    #[test]
    fn branched_dag_orders_by_declaration() {
        let steps = vec![PresetStep::new("src", OperationKind::GenerateImage, &["e"]),
                         PresetStep::new("left", OperationKind::Upscale, &["e"]).depends_on(&["src"]),
                         PresetStep::new("right", OperationKind::GenerateVideo, &["e"]).depends_on(&["src"]),
                         PresetStep::new("join", OperationKind::ApplyLipSync, &["e"])
                             .depends_on(&["left", "right"])
                             .identity_inputs(&[])];
        let p = WorkflowPreset::publish("dag", 1, &[], &[], steps, &[QualityLevel::Low], false,
                                        IndexMap::new()).unwrap();
        assert_eq!(p.topological_order().unwrap(), vec!["src", "left", "right", "join"]);
    }
}
