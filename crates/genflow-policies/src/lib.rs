//! genflow-policies: injectable policy data for the orchestrator.
//!
//! Pricing and retry behavior are data, not logic: the orchestrator
//! receives a `CostTable` and a `RetryPolicy` at construction and never
//! hardcodes either. Cost estimation is a deterministic fold over the
//! table so the same preset and quality always price the same.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use genflow_domain::{DomainError, OperationKind, QualityLevel, WorkflowPreset};

/// Price of one operation on one engine at one quality tier, in credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEntry {
    pub engine_id: String,
    pub operation: OperationKind,
    pub quality: QualityLevel,
    pub credits: u64,
}

/// Per-engine/operation/quality pricing. serde-loadable so deployments
/// can ship their own table; `builtin_demo` exists for tests and the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostTable {
    entries: Vec<CostEntry>,
}

impl CostTable {
    pub fn new(entries: Vec<CostEntry>) -> Self {
        Self { entries }
    }

    pub fn with_entry(mut self,
                      engine_id: &str,
                      operation: OperationKind,
                      quality: QualityLevel,
                      credits: u64)
                      -> Self {
        self.entries.push(CostEntry { engine_id: engine_id.to_string(),
                                      operation,
                                      quality,
                                      credits });
        self
    }

    /// Price for a concrete engine/operation/quality. `None` if the
    /// table has no entry (free local engines simply price at 0).
    pub fn cost(&self, engine_id: &str, operation: OperationKind, quality: QualityLevel) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.engine_id == engine_id && e.operation == operation && e.quality == quality)
            .map(|e| e.credits)
    }

    /// Estimated cost of a whole preset run: for each step, the price of
    /// its first candidate engine (the one the orchestrator tries first).
    /// A step whose first candidate has no entry estimates at 0, which
    /// keeps free local engines free without special-casing them.
    pub fn estimate(&self, preset: &WorkflowPreset, quality: QualityLevel) -> Result<u64, DomainError> {
        if !preset.supports_quality(quality) {
            return Err(DomainError::Validation(format!(
                "preset '{}' does not offer quality tier '{quality}'", preset.id()
            )));
        }
        let mut total = 0u64;
        for step in preset.steps() {
            let first = &step.engine_candidates[0];
            total += self.cost(first, step.operation, quality).unwrap_or(0);
        }
        Ok(total)
    }

    /// Load a deployment-supplied table from its JSON form.
    pub fn from_json(raw: &str) -> Result<Self, DomainError> {
        serde_json::from_str(raw).map_err(|e| DomainError::Validation(format!("cost table: {e}")))
    }

    /// Demo pricing used by the CLI and tests only.
    pub fn builtin_demo() -> Self {
        let mut t = Self::default();
        for (quality, base) in [(QualityLevel::Low, 1u64), (QualityLevel::Standard, 2), (QualityLevel::Pro, 5)] {
            t = t.with_entry("cloud-img", OperationKind::GenerateImage, quality, 5 * base)
                 .with_entry("cloud-vid", OperationKind::GenerateVideo, quality, 20 * base)
                 .with_entry("cloud-sync", OperationKind::ApplyLipSync, quality, 10 * base)
                 .with_entry("cloud-up", OperationKind::Upscale, quality, 3 * base);
        }
        t
    }
}

/// Timeout and bounded backoff applied between candidate attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Deadline for a single adapter call.
    pub attempt_timeout: Duration,
    /// Delay before the first fallback attempt.
    pub backoff_base: Duration,
    /// Backoff never exceeds this, whatever the attempt number.
    pub backoff_cap: Duration,
}

impl RetryPolicy {
    /// Exponential, capped: base * 2^attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base.saturating_mul(1u32 << attempt.min(16));
        exp.min(self.backoff_cap)
    }

    /// Tight timings for tests and local demos.
    pub fn fast() -> Self {
        Self { attempt_timeout: Duration::from_millis(250),
               backoff_base: Duration::from_millis(1),
               backoff_cap: Duration::from_millis(8) }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempt_timeout: Duration::from_secs(120),
               backoff_base: Duration::from_millis(500),
               backoff_cap: Duration::from_secs(8) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genflow_domain::PresetStep;
    use indexmap::IndexMap;

    fn preset() -> WorkflowPreset {
        WorkflowPreset::publish("img-up", 1, &["prompt"], &[],
                                vec![PresetStep::new("image", OperationKind::GenerateImage, &["cloud-img", "local-img"]),
                                     PresetStep::new("upscale", OperationKind::Upscale, &["cloud-up"]).depends_on(&["image"])],
                                &[QualityLevel::Standard, QualityLevel::Pro],
                                false,
                                IndexMap::new()).unwrap()
    }

    #[test]
    fn estimate_sums_first_candidates_deterministically() {
        let table = CostTable::builtin_demo();
        let a = table.estimate(&preset(), QualityLevel::Standard).unwrap();
        let b = table.estimate(&preset(), QualityLevel::Standard).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, 10 + 6); // cloud-img + cloud-up at standard
    }

    #[test]
    fn tiers_scale_the_estimate() {
        let table = CostTable::builtin_demo();
        let std = table.estimate(&preset(), QualityLevel::Standard).unwrap();
        let pro = table.estimate(&preset(), QualityLevel::Pro).unwrap();
        assert!(pro > std);
    }

    #[test]
    fn unsupported_tier_is_a_validation_error() {
        let table = CostTable::builtin_demo();
        let err = table.estimate(&preset(), QualityLevel::Low).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unpriced_engine_estimates_at_zero() {
        let table = CostTable::default();
        assert_eq!(table.estimate(&preset(), QualityLevel::Standard).unwrap(), 0);
    }

    #[test]
    fn table_loads_from_json() {
        let raw = r#"{"entries": [
            {"engine_id": "cloud-img", "operation": "generate_image", "quality": "standard", "credits": 12}
        ]}"#;
        let table = CostTable::from_json(raw).unwrap();
        assert_eq!(table.cost("cloud-img", OperationKind::GenerateImage, QualityLevel::Standard),
                   Some(12));
        assert!(matches!(CostTable::from_json("not a table"),
                         Err(DomainError::Validation(_))));
    }

    #[test]
    fn backoff_is_bounded() {
        let p = RetryPolicy { attempt_timeout: Duration::from_secs(1),
                              backoff_base: Duration::from_millis(100),
                              backoff_cap: Duration::from_millis(350) };
        assert_eq!(p.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(p.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(p.backoff_delay(2), Duration::from_millis(350));
        assert_eq!(p.backoff_delay(30), Duration::from_millis(350));
    }
}
