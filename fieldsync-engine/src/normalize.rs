//! Value normalizers, comparators and input filters for field bindings.

use fieldsync_core::value::canonical_text;
use fieldsync_core::FieldValue;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

/// Rewrites raw input before it is forwarded. Must be idempotent.
pub type Normalizer = Arc<dyn Fn(&FieldValue) -> FieldValue + Send + Sync>;

/// `true` when the candidate equals the known server value.
pub type Comparator = Arc<dyn Fn(Option<&FieldValue>, &FieldValue) -> bool + Send + Sync>;

/// `false` rejects a keystroke outright.
pub type InputFilter = Arc<dyn Fn(&FieldValue) -> bool + Send + Sync>;

/// Trim surrounding whitespace of string values.
pub fn trim(value: &FieldValue) -> FieldValue {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other.clone(),
    }
}

/// Accept a comma as decimal separator.
pub fn decimal_comma(value: &FieldValue) -> FieldValue {
    match value {
        Value::String(s) => Value::String(s.replace(',', ".")),
        other => other.clone(),
    }
}

/// Only let through strings that are a (partial) number.
pub fn decimal_filter(allow_negative: bool, allow_decimal: bool) -> InputFilter {
    let sign = if allow_negative { "-?" } else { "" };
    let digits = if allow_decimal {
        "([0-9]+[,.])?[0-9]*"
    } else {
        "[0-9]*"
    };
    let pattern = Regex::new(&format!("^{sign}{digits}$")).expect("Invalid decimal input regex");
    Arc::new(move |value| match value {
        Value::String(s) => pattern.is_match(s),
        _ => true,
    })
}

/// Default comparator: numbers by canonical string form, everything else trimmed.
pub fn same_text(known: Option<&FieldValue>, candidate: &FieldValue) -> bool {
    let known = known.map(canonical_text).unwrap_or_default();
    known == canonical_text(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trim_is_idempotent() {
        let once = trim(&json!("  Lab A "));
        assert_eq!(once, json!("Lab A"));
        assert_eq!(trim(&once), once);
        assert_eq!(trim(&json!(5)), json!(5));
    }

    #[test]
    fn test_decimal_comma() {
        assert_eq!(decimal_comma(&json!("3,5")), json!("3.5"));
        assert_eq!(decimal_comma(&decimal_comma(&json!("3,5"))), json!("3.5"));
    }

    #[test]
    fn test_decimal_filter() {
        let signed = decimal_filter(true, true);
        for ok in ["", "-", "12", "-1.5", "3,25", "0."] {
            assert!(signed(&json!(ok)), "{ok} should pass");
        }
        for bad in ["abc", "1.2.3", "--1", "1e5"] {
            assert!(!signed(&json!(bad)), "{bad} should be rejected");
        }
        let unsigned_int = decimal_filter(false, false);
        assert!(unsigned_int(&json!("42")));
        assert!(!unsigned_int(&json!("-42")));
        assert!(!unsigned_int(&json!("4.2")));
    }

    #[test]
    fn test_same_text() {
        assert!(same_text(Some(&json!(3)), &json!("3 ")));
        assert!(same_text(Some(&json!("Lab A")), &json!(" Lab A")));
        assert!(same_text(None, &json!("")));
        assert!(!same_text(Some(&json!(3)), &json!("3.5")));
    }
}
