//! Small helpers over document sources

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Characters removed from suggestion tokens
const SUGGESTION_NOISE: &[char] = &['[', ']', '(', ')', '{', '}', ':', ','];

/// Flatten nested source objects into dotted keys:
/// `{"name": {"en": "x"}}` becomes `name.en -> x`.
///
/// Nulls are dropped, other scalars use their JSON text and arrays join their
/// flattened elements with a space.
pub fn flatten_source(source: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut flattened = BTreeMap::new();
    flatten_into(source, "", &mut flattened);
    flattened
}

fn flatten_into(source: &Map<String, Value>, prefix: &str, out: &mut BTreeMap<String, String>) {
    for (key, value) in source {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(nested, &path, out),
            other => {
                if let Some(text) = scalar_text(other) {
                    out.insert(path, text);
                }
            }
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        Value::Object(_) => None,
        other => Some(other.to_string()),
    }
}

/// Lower-case, strip bracket and punctuation noise, collapse whitespace.
///
/// `"Diabetes, Type [2]"` becomes `"diabetes type 2"`.
pub fn clean_suggestion(value: &str) -> String {
    value
        .to_lowercase()
        .split_whitespace()
        .map(|token| token.replace(SUGGESTION_NOISE, ""))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
