//! Engine configuration and injectable session options.

use fieldsync_core::{ErrorItem, Record};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_DEBOUNCE_MS: u64 = 400;
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 300;
pub const DEFAULT_PLACEHOLDER_MESSAGE: &str = "Another field has an error.";
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Invalid value";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Quiet period after the last edit before the accumulated patch is sent.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// How long a success acknowledgment stays visible.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// Shown on dispatched fields the server did not name when a sibling failed.
    #[serde(default = "default_placeholder_message")]
    pub placeholder_message: String,
    /// Used when the server named a field but gave no usable message.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_ack_timeout_ms() -> u64 {
    DEFAULT_ACK_TIMEOUT_MS
}

fn default_placeholder_message() -> String {
    DEFAULT_PLACEHOLDER_MESSAGE.to_string()
}

fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            placeholder_message: default_placeholder_message(),
            fallback_message: default_fallback_message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl SessionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "debounce_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.ack_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ack_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.placeholder_message.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "placeholder_message",
                reason: "must not be empty".to_string(),
            });
        }
        if self.fallback_message.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "fallback_message",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Maps a backend field key to a local field name; `None` drops the entry.
pub type FieldKeyMapper = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Renders one error item as display text.
pub type MessageRenderer = Arc<dyn Fn(&ErrorItem) -> String + Send + Sync>;

/// Per-entity pieces supplied by the caller.
#[derive(Clone)]
pub struct SessionOptions {
    /// Initial draft in create mode.
    pub defaults: Record,
    pub map_field_key: FieldKeyMapper,
    pub to_message: MessageRenderer,
}

impl SessionOptions {
    pub fn with_defaults(mut self, defaults: Record) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_key_mapper(
        mut self,
        mapper: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.map_field_key = Arc::new(mapper);
        self
    }

    pub fn with_message_renderer(
        mut self,
        renderer: impl Fn(&ErrorItem) -> String + Send + Sync + 'static,
    ) -> Self {
        self.to_message = Arc::new(renderer);
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            defaults: Record::new(),
            map_field_key: Arc::new(|key| Some(key.to_string())),
            to_message: Arc::new(default_message),
        }
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

/// Message if present, otherwise the key. Empty results get the fallback later.
fn default_message(item: &ErrorItem) -> String {
    if !item.message.is_empty() {
        item.message.clone()
    } else {
        item.key.clone()
    }
}
