//! Event types emitted while driving a session.

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Create,
    Patch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The fetched record became the draft.
    Loaded,
    LoadFailed(SessionError),
    /// A write left the accumulator.
    Dispatched { kind: WriteKind, fields: Vec<String> },
    Saved { fields: Vec<String> },
    /// The create succeeded. Any location that encodes the identifier must be updated.
    Created { id: String, fields: Vec<String> },
    /// The server answered with validation or global errors.
    Rejected { fields: Vec<String> },
    /// The write did not complete. After a transport failure the payload went
    /// back into the accumulator; after [`SessionError::MissingIdentifier`]
    /// later writes are held.
    WriteFailed(SessionError),
}
