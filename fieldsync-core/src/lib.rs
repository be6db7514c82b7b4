//! fieldsync Core - Entity Types
//!
//! Pure data structures shared by the engine, the HTTP client and the test
//! utilities. No timers, no I/O.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod api;
pub mod envelope;
pub mod error;
pub mod request_error;
pub mod value;

pub use api::EntityApi;
pub use envelope::{Envelope, Status};
pub use error::{CoreError, TransportError};
pub use request_error::{ErrorItem, RequestError};

// ============================================================================
// RECORD TYPES
// ============================================================================

/// A single field value: scalar, boolean, null or a reference-entity object.
pub type FieldValue = serde_json::Value;

/// A flat mapping from field name to value.
pub type Record = serde_json::Map<String, FieldValue>;

/// Name of the identifier field returned by the backend on create.
pub const ID_FIELD: &str = "uuid";

/// Route token reserved for "new, unsaved record".
pub const CREATE_SENTINEL: &str = "create";

/// Build a record holding exactly one field.
pub fn single_field(name: impl Into<String>, value: FieldValue) -> Record {
    let mut record = Record::new();
    record.insert(name.into(), value);
    record
}

// ============================================================================
// FIELD STATE
// ============================================================================

/// Outcome of the last write that touched a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldState {
    #[default]
    Undefined,
    Success,
    Error,
}

impl FieldState {
    /// `Success` and `Error` are final; `Undefined` means "being edited or never written".
    pub fn is_final(self) -> bool {
        matches!(self, FieldState::Success | FieldState::Error)
    }
}

// ============================================================================
// SESSION IDENTIFIER
// ============================================================================

/// Identifier of one editing session: either a pending create or an existing record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionId {
    Create,
    Existing(String),
}

impl SessionId {
    /// Parse a route token. The literal `"create"` is reserved.
    pub fn parse(token: &str) -> Result<Self, CoreError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CoreError::EmptyIdentifier);
        }
        if token == CREATE_SENTINEL {
            return Ok(SessionId::Create);
        }
        Ok(SessionId::Existing(token.to_string()))
    }

    pub fn existing(id: impl Into<String>) -> Self {
        SessionId::Existing(id.into())
    }

    pub fn is_create(&self) -> bool {
        matches!(self, SessionId::Create)
    }

    /// Record identifier, `None` in create mode.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            SessionId::Create => None,
            SessionId::Existing(id) => Some(id),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionId::Create => f.write_str(CREATE_SENTINEL),
            SessionId::Existing(id) => f.write_str(id),
        }
    }
}

impl std::str::FromStr for SessionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionId::parse(s)
    }
}
