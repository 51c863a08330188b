//! Lenient parsing of model output into JSON.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("static regex"))
}

/// Parse model output into a JSON value. Never fails.
///
/// Tries, in order: the first fenced code block, the whole text, then the
/// slice between the first opening and last closing bracket. Anything else
/// yields an empty object.
pub fn parse_structured(text: &str) -> Value {
    let body = fenced_block()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    let cleaned: String = body
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let cleaned = cleaned.trim();

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return value;
    }

    let start = cleaned.find(['{', '[']);
    let end = cleaned.rfind(['}', ']']);
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&cleaned[start..=end]) {
                return value;
            }
        }
    }

    Value::Object(Map::new())
}

/// Null, empty objects and empty arrays count as "nothing parsed".
pub fn is_empty_structure(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
