//! Step input resolution.
//!
//! Deterministic merge pipeline: step defaults first, caller inputs on
//! top, then `{{stepId.output}}` placeholders substituted with the
//! artifact refs of already-completed dependency steps. A placeholder
//! may only name a step listed in `depends_on`, which enforces the
//! invariant that no step reads an artifact before its dependency
//! resolution completed.

use std::collections::HashMap;

use serde_json::Value;

use genflow_domain::{ErrorCode, PresetStep};

use crate::errors::CoreError;

/// Shallow merge: keys of `over` win when both sides are objects;
/// otherwise `over` replaces the value wholesale.
pub fn merge_json(base: &Value, over: &Value) -> Value {
    match (base, over) {
        (Value::Object(a), Value::Object(b)) => {
            let mut out = a.clone();
            for (k, v) in b {
                out.insert(k.clone(), v.clone());
            }
            Value::Object(out)
        }
        (_, other) => other.clone(),
    }
}

fn placeholder_target(s: &str) -> Option<(&str, &str)> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?.trim();
    let (step, field) = inner.split_once('.')?;
    Some((step.trim(), field.trim()))
}

fn substitute(value: &Value,
              step: &PresetStep,
              refs_by_step: &HashMap<String, Vec<String>>)
              -> Result<Value, CoreError> {
    match value {
        Value::String(s) => {
            let Some((dep, field)) = placeholder_target(s) else {
                return Ok(value.clone());
            };
            if !step.depends_on.iter().any(|d| d == dep) {
                return Err(CoreError::rejected(
                    ErrorCode::ValidationError,
                    format!("step '{}' references '{dep}' which is not in its depends_on", step.step_id),
                ));
            }
            let refs = refs_by_step.get(dep).filter(|r| !r.is_empty()).ok_or_else(|| {
                CoreError::rejected(ErrorCode::FileNotFound,
                                    format!("no artifact from dependency step '{dep}' for '{}'", step.step_id))
            })?;
            if field == "outputs" {
                Ok(Value::Array(refs.iter().cloned().map(Value::String).collect()))
            } else {
                Ok(Value::String(refs[0].clone()))
            }
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(substitute(item, step, refs_by_step)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), substitute(v, step, refs_by_step)?);
            }
            Ok(Value::Object(out))
        }
        _ => Ok(value.clone()),
    }
}

/// Resolved inputs for one step execution.
pub fn resolve_step_inputs(step: &PresetStep,
                           caller_inputs: &Value,
                           refs_by_step: &HashMap<String, Vec<String>>)
                           -> Result<Value, CoreError> {
    let merged = merge_json(&step.params, caller_inputs);
    substitute(&merged, step, refs_by_step)
}
