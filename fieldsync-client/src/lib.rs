//! fieldsync Client
//!
//! HTTP implementation of the entity API plus configuration and tracing
//! setup for driving edit sessions from the command line.

pub mod cli;
pub mod config;
pub mod error;
pub mod rest;
pub mod telemetry;

pub use config::{ClientConfig, ConfigError};
pub use error::ClientError;
pub use rest::{envelope_from_response, NoRefresh, RestEntityApi, SessionExpiryHandler};
