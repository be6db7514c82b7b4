//! Error types for fieldsync core operations

use thiserror::Error;

/// Errors raised while building core values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Session identifier must not be empty")]
    EmptyIdentifier,
}

/// A request that produced no response at all.
///
/// Non-2xx responses are not transport errors; they arrive as error envelopes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to decode response: {0}")]
    Decode(String),
}
