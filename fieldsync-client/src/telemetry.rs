//! Tracing subscriber setup.

use crate::error::ClientError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "fieldsync=info";

/// Resolve the filter: `RUST_LOG` first, then the configured directive.
pub fn env_filter(configured: Option<&str>) -> Result<EnvFilter, ClientError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(configured.unwrap_or(DEFAULT_LOG_FILTER))
        .map_err(|e| ClientError::Telemetry(format!("Invalid log filter: {}", e)))
}

/// Install a fmt subscriber writing to stderr.
pub fn init_tracing(configured: Option<&str>) -> Result<(), ClientError> {
    let env_filter = env_filter(configured)?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| ClientError::Telemetry(format!("Failed to init subscriber: {}", e)))?;

    tracing::debug!(filter = ?configured, "Tracing initialized");
    Ok(())
}
