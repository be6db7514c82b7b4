//! fieldsync Engine - Optimistic Field Synchronization
//!
//! Edits are applied to a local draft immediately, coalesced per record and
//! written back after a debounce window. Server answers are reconciled into
//! per-field error and state maps.
//!
//! - [`EditSession`]: load, edit, debounce, write, reconcile
//! - [`FieldBinding`]: adapter between raw input and a session
//! - [`SaveAcknowledgment`]: transient success/error indicator per field

pub mod ack;
pub mod binding;
pub mod config;
pub mod error;
pub mod events;
pub mod normalize;
pub mod reconcile;
pub mod scheduler;
pub mod session;

pub use ack::{AckKind, AckPhase, AckSignal, SaveAcknowledgment};
pub use binding::{EditMode, FieldBinding, FieldSink, FieldView};
pub use config::{ConfigError, FieldKeyMapper, MessageRenderer, SessionConfig, SessionOptions};
pub use error::SessionError;
pub use events::{SessionEvent, WriteKind};
pub use reconcile::{FieldBook, Reconciler};
pub use scheduler::{Offer, PatchScheduler};
pub use session::EditSession;
