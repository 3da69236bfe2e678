//! String normalization for bound values.
//!
//! Line endings become LF, surrounding spaces and tabs are trimmed (newlines
//! are kept), and the result is put in Unicode NFC.

use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

pub fn normalize_string(value: &str) -> String {
    let unified = value.replace("\r\n", "\n").replace('\r', "\n");
    unified
        .trim_matches(|c: char| c == ' ' || c == '\t')
        .nfc()
        .collect()
}

/// Normalize every string leaf, keeping structure and key order.
pub fn normalize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_string(s)),
        Value::Array(items) => Value::Array(items.iter().map(normalize_value).collect()),
        Value::Object(map) => Value::Object(normalize_map(map)),
        _ => value.clone(),
    }
}

pub fn normalize_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, item)| (key.clone(), normalize_value(item)))
        .collect()
}
