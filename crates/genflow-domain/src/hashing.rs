//! Canonical JSON + hash helpers.
//!
//! Stable references (preset definition hashes, artifact refs) are
//! blake3 over a canonical JSON rendering: object keys sorted, no
//! whitespace. Keeping the canonicalization here means every crate
//! derives identity the same way.

use std::collections::BTreeMap;

use serde_json::Value;

/// Render `value` with sorted object keys and no insignificant whitespace.
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // serde_json string escaping is infallible
        Value::String(s) => serde_json::to_string(s).unwrap(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let mut tree = BTreeMap::new();
            for (k, v) in map {
                tree.insert(k, to_canonical_json(v));
            }
            let items: Vec<String> = tree.into_iter()
                                         .map(|(k, v)| format!("{}:{}", serde_json::to_string(&k).unwrap(), v))
                                         .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

/// blake3 hex digest of a string.
pub fn hash_str(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

/// blake3 hex digest of the canonical rendering of a JSON value.
pub fn hash_value(value: &Value) -> String {
    hash_str(&to_canonical_json(value))
}
