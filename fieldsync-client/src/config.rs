//! Configuration loading for the fieldsync client.
//!
//! Connection fields are required. The `[session]` table falls back to the
//! engine defaults when absent.

use fieldsync_engine::SessionConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "FIELDSYNC_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Collection path below the base URL, e.g. `api/laboratories`.
    pub entity_path: String,
    pub request_timeout_ms: u64,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default)]
    pub log_filter: Option<String>,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or FIELDSYNC_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error(transparent)]
    Session(#[from] fieldsync_engine::ConfigError),
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if self.entity_path.trim_matches('/').trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "entity_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self
            .log_filter
            .as_deref()
            .is_some_and(|filter| filter.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                field: "log_filter",
                reason: "must not be empty when set".to_string(),
            });
        }
        self.session.validate()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
api_base_url = "http://localhost:8080"
entity_path = "api/laboratories"
request_timeout_ms = 5000
"#;

    #[test]
    fn test_minimal_config_uses_session_defaults() {
        let config = ClientConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.session, SessionConfig::default());
        assert!(config.log_filter.is_none());
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_session_table_overrides_defaults() {
        let contents = format!("{MINIMAL}\n[session]\ndebounce_ms = 250\n");
        let config = ClientConfig::from_toml(&contents).unwrap();
        assert_eq!(config.session.debounce_ms, 250);
        assert_eq!(
            config.session.ack_timeout_ms,
            SessionConfig::default().ack_timeout_ms
        );
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let contents = format!("{MINIMAL}\nretries = 3\n");
        assert!(matches!(
            ClientConfig::from_toml(&contents),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_session_config_fails_validation() {
        let contents = format!("{MINIMAL}\n[session]\ndebounce_ms = 0\n");
        let config = ClientConfig::from_toml(&contents).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Session(_))));
    }
}
