//! Type-aware value comparison used to suppress no-op writes.

use crate::{FieldValue, ID_FIELD};
use serde_json::Value;

/// Loose equality between an edited value and a known value.
///
/// Exact JSON equality, strings equal after trimming, or two reference
/// entities carrying the same identifier.
pub fn same_value(a: &FieldValue, b: &FieldValue) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.trim() == b.trim(),
        (Value::Object(_), Value::Object(_)) => match (reference_id(a), reference_id(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

/// Identifier of a reference-entity value, if it has one.
pub fn reference_id(value: &FieldValue) -> Option<&str> {
    value
        .as_object()
        .and_then(|obj| obj.get(ID_FIELD))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Canonical string form used by the field adapter's default comparator.
///
/// Numbers render in their canonical decimal form, strings are trimmed,
/// reference entities collapse to their identifier.
pub fn canonical_text(value: &FieldValue) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => canonical_number(n),
        Value::String(s) => s.trim().to_string(),
        Value::Object(_) => match reference_id(value) {
            Some(id) => id.to_string(),
            None => value.to_string(),
        },
        Value::Array(_) => value.to_string(),
    }
}

fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        // 3.0 and 3 are the same number for an input field
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Text shown in an input buffer. Strings are kept verbatim.
pub fn display_text(value: Option<&FieldValue>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => canonical_text(other),
    }
}
