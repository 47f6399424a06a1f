//! Safe lookups into nested FHIR JSON
//!
//! Every accessor takes a JSON pointer (`/type/coding/0/code`) and treats a
//! missing key, an out-of-range index, or a value of the wrong shape as
//! empty. Extractors never branch on presence themselves.

use serde_json::Value;

static NULL: Value = Value::Null;

/// Resolve a pointer, yielding `null` for anything missing
pub fn get<'v>(value: &'v Value, pointer: &str) -> &'v Value {
    value.pointer(pointer).unwrap_or(&NULL)
}

/// Resolve a pointer to a scalar rendered as text
///
/// Strings are returned as-is, numbers and booleans are stringified, and
/// everything else (missing, null, objects, arrays) becomes `""`.
pub fn text(value: &Value, pointer: &str) -> String {
    scalar_text(get(value, pointer))
}

/// Resolve a pointer to an array, yielding an empty slice otherwise
pub fn items<'v>(value: &'v Value, pointer: &str) -> &'v [Value] {
    match get(value, pointer) {
        Value::Array(arr) => arr,
        _ => &[],
    }
}

/// Join the string elements of an array with `sep`
pub fn joined(value: &Value, pointer: &str, sep: &str) -> String {
    items(value, pointer)
        .iter()
        .map(scalar_text)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Reduce a FHIR reference (`"Patient/abc"`) to the id it points at
///
/// A reference without a `/` is already an id. Version suffixes
/// (`"Patient/abc/_history/2"`) are dropped before taking the last segment.
pub fn dereference(reference: &str) -> &str {
    let unversioned = match reference.find("/_history/") {
        Some(idx) => &reference[..idx],
        None => reference,
    };
    unversioned.rsplit('/').next().unwrap_or(unversioned)
}

/// Resolve a pointer to a `reference` string and dereference it
pub fn reference_id(value: &Value, pointer: &str) -> String {
    dereference(&text(value, pointer)).to_string()
}
