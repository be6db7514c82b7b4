//! Session-level errors.
//!
//! These are never returned as `Err` from the session. They are stored as
//! state and reported through [`crate::SessionEvent`].

use fieldsync_core::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Record {id} not found")]
    NotFound { id: String },

    #[error("Failed to load record: {message}")]
    Load { message: String },

    #[error("Request failed: {message}")]
    Transport { message: String },

    /// The backend created the record but did not say under which identifier.
    #[error("Create succeeded without an identifier; further writes are held")]
    MissingIdentifier,
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        SessionError::Transport {
            message: err.to_string(),
        }
    }
}
