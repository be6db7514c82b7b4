//! Canonical error shape and the normalizer that coerces any raw error body into it.
//!
//! The backend contract is `{ global: ErrorItem[], fields: { name: ErrorItem[] } }`,
//! but proxies, partial failures and mis-serialized exceptions produce bodies that
//! do not follow it. [`RequestError::normalize`] never fails: anything it cannot
//! interpret becomes a generic global item, so a malformed body is never dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key of the item synthesized when nothing usable was received.
pub const UNKNOWN_ERROR_KEY: &str = "fe.generic.unknownError";
/// Message of the item synthesized when nothing usable was received.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown request error occurred";
/// Backup key for items that carried a message but no key.
pub const ONLY_MESSAGE_KEY: &str = "fe.generic.onlyMessageNoKey";
/// Key for a bare string body wrapped into a global item.
pub const STRING_WRAPPED_KEY: &str = "fe.generic.stringResponseWrapped";
/// Global key the backend uses for a missing entity.
pub const NOT_FOUND_KEY: &str = "error.ResourceNotFoundException";

/// One error entry as sent by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorItem {
    pub key: String,
    pub message: String,
}

impl ErrorItem {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }

    /// The generic item used whenever the payload is unusable.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_ERROR_KEY, UNKNOWN_ERROR_MESSAGE)
    }

    /// Coerce a single raw entry. Objects keep their `key`/`message` strings,
    /// a message without key gets the backup key, a bare string becomes a message.
    fn from_raw(raw: &Value) -> Self {
        match raw {
            Value::Object(obj) => {
                let key = obj.get("key").and_then(Value::as_str);
                let message = obj.get("message").and_then(Value::as_str);
                match (key, message) {
                    (Some(key), message) => Self::new(key, message.unwrap_or_default()),
                    (None, Some(message)) => Self::new(ONLY_MESSAGE_KEY, message),
                    (None, None) => Self::unknown(),
                }
            }
            Value::String(message) if !message.is_empty() => {
                Self::new(ONLY_MESSAGE_KEY, message.as_str())
            }
            _ => Self::unknown(),
        }
    }
}

/// Canonical error shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    #[serde(default)]
    pub global: Vec<ErrorItem>,
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<ErrorItem>>,
}

impl RequestError {
    /// A single generic global item and no field errors.
    pub fn generic() -> Self {
        Self {
            global: vec![ErrorItem::unknown()],
            fields: BTreeMap::new(),
        }
    }

    /// Error whose only content is one global item.
    pub fn global_only(item: ErrorItem) -> Self {
        Self {
            global: vec![item],
            fields: BTreeMap::new(),
        }
    }

    /// Builder used mostly by tests and mocks.
    pub fn with_field(mut self, field: impl Into<String>, item: ErrorItem) -> Self {
        self.fields.entry(field.into()).or_default().push(item);
        self
    }

    /// Normalize an arbitrary error body.
    pub fn normalize(raw: Option<&Value>) -> Self {
        match raw {
            Some(Value::Object(obj)) => Self::from_object(obj),
            Some(Value::String(text)) if !text.is_empty() => {
                Self::global_only(ErrorItem::new(STRING_WRAPPED_KEY, text.as_str()))
            }
            _ => Self::generic(),
        }
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        let fields = obj.get("fields").and_then(Value::as_object);

        // Close to valid: only the item shapes need coercing.
        if let (Some(Value::Array(items)), Some(fields)) = (obj.get("global"), fields) {
            return Self {
                global: items.iter().map(ErrorItem::from_raw).collect(),
                fields: coerce_fields(fields),
            };
        }

        let mut global = Vec::new();
        match obj.get("global") {
            Some(Value::Array(items)) => global.extend(items.iter().map(ErrorItem::from_raw)),
            Some(Value::Object(single)) if single.get("message").is_some_and(Value::is_string) => {
                global.push(ErrorItem::from_raw(&Value::Object(single.clone())));
            }
            _ if fields.is_none() => global.push(ErrorItem::unknown()),
            _ => {}
        }

        Self {
            global,
            fields: fields.map(coerce_fields).unwrap_or_default(),
        }
    }

    pub fn has_field_errors(&self) -> bool {
        !self.fields.is_empty()
    }

    /// True when the backend reported a missing entity.
    pub fn is_not_found(&self) -> bool {
        self.global.iter().any(|item| item.key == NOT_FOUND_KEY)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn coerce_fields(fields: &Map<String, Value>) -> BTreeMap<String, Vec<ErrorItem>> {
    fields
        .iter()
        .map(|(name, items)| {
            let items = match items {
                Value::Array(items) => items.iter().map(ErrorItem::from_raw).collect(),
                _ => Vec::new(),
            };
            (name.clone(), items)
        })
        .collect()
}
