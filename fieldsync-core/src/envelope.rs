//! Uniform response envelope returned by every collaborator operation.

use crate::request_error::RequestError;
use crate::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// `{ status, data, error }` as produced by the transport.
///
/// `error` holds the raw body untouched; it is only normalized when read
/// through [`Envelope::request_error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub data: Option<Record>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Envelope {
    pub fn success(data: Record) -> Self {
        Self {
            status: Status::Success,
            status_code: None,
            data: Some(data),
            error: None,
        }
    }

    /// Success without a body (e.g. `204 No Content`).
    pub fn empty_success() -> Self {
        Self {
            status: Status::Success,
            status_code: None,
            data: None,
            error: None,
        }
    }

    pub fn error(raw: Value) -> Self {
        Self {
            status: Status::Error,
            status_code: None,
            data: None,
            error: Some(raw),
        }
    }

    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Normalized error for error envelopes, `None` on success.
    pub fn request_error(&self) -> Option<RequestError> {
        match self.status {
            Status::Success => None,
            Status::Error => Some(RequestError::normalize(self.error.as_ref())),
        }
    }

    /// A 404 status, or a not-found key in the error body.
    pub fn is_not_found(&self) -> bool {
        if self.is_success() {
            return false;
        }
        self.status_code == Some(404)
            || self
                .request_error()
                .is_some_and(|error| error.is_not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_error::{ErrorItem, NOT_FOUND_KEY};
    use serde_json::json;

    #[test]
    fn test_success_has_no_request_error() {
        let envelope = Envelope::success(crate::single_field("name", json!("Lab A")));
        assert!(envelope.is_success());
        assert!(envelope.request_error().is_none());
    }

    #[test]
    fn test_error_envelope_normalizes_lazily() {
        let envelope = Envelope::error(json!("Bad gateway")).with_status_code(502);
        assert_eq!(envelope.error, Some(json!("Bad gateway")));
        let error = envelope.request_error().unwrap();
        assert_eq!(error.global[0].message, "Bad gateway");
    }

    #[test]
    fn test_not_found_by_status_or_key() {
        assert!(Envelope::error(Value::Null).with_status_code(404).is_not_found());
        let keyed = RequestError::global_only(ErrorItem::new(NOT_FOUND_KEY, "gone"));
        assert!(Envelope::error(keyed.to_value()).is_not_found());
        assert!(!Envelope::error(Value::Null).with_status_code(500).is_not_found());
    }

    #[test]
    fn test_wire_shape() {
        let envelope: Envelope = serde_json::from_value(json!({
            "status": "error",
            "statusCode": 400,
            "data": null,
            "error": { "global": [], "fields": {} }
        }))
        .unwrap();
        assert_eq!(envelope.status, Status::Error);
        assert_eq!(envelope.status_code, Some(400));
    }
}
