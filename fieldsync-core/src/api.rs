//! Collaborator contract for the remote entity API.

use crate::envelope::Envelope;
use crate::error::TransportError;
use crate::Record;
use async_trait::async_trait;

/// Generic list/detail persistence API for one entity type.
///
/// Every operation resolves to an [`Envelope`]. `Err` is reserved for requests
/// that got no response at all.
#[async_trait]
pub trait EntityApi: Send + Sync {
    /// Fetch one record by identifier.
    async fn fetch(&self, id: &str) -> Result<Envelope, TransportError>;

    /// Persist a new record; the response carries the generated identifier.
    async fn create(&self, payload: Record) -> Result<Envelope, TransportError>;

    /// Partial update; the response carries at least the changed fields.
    async fn patch(&self, id: &str, payload: Record) -> Result<Envelope, TransportError>;

    /// Soft-delete a record.
    async fn remove(&self, id: &str) -> Result<Envelope, TransportError>;
}
