// src/pipeline/extract.rs

//! Recursive extraction of leaf values along a dotted key path.

use serde_json::Value;

/// Walk a JSON value along the given path segments, returning the flat
/// sequence of leaves in traversal order.
///
/// - No segments remaining: the current value is a leaf, returned as-is.
/// - Arrays broadcast: the same remaining path is applied to every element
///   and the results are concatenated in element order.
/// - Objects descend into the next segment when the key is present.
/// - An absent key, or a scalar with segments remaining, yields nothing
///   from that branch.
///
/// Duplicates are preserved; nothing is sorted.
pub fn extract(value: &Value, path: &[&str]) -> Vec<Value> {
    if path.is_empty() {
        return vec![value.clone()];
    }
    match value {
        Value::Array(items) => items.iter().flat_map(|item| extract(item, path)).collect(),
        Value::Object(map) => map
            .get(path[0])
            .map(|child| extract(child, &path[1..]))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Split a dotted extract path into its segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Render an extracted leaf as a substitution value.
///
/// Only scalars can be spliced into an endpoint; null and structured leaves
/// return `None`.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
