//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `github_api_url` is not an http(s) URL
    /// - `symbols.default_limit` is 0 or above 1000
    /// - `db_path` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(100..=300_000).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: format!("must be between 100ms and 5 minutes, got {}ms", self.timeout_ms),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if !(self.github_api_url.starts_with("https://") || self.github_api_url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                field: "github_api_url".into(),
                reason: "must be an http or https URL".into(),
            });
        }

        if self.symbols.default_limit == 0 || self.symbols.default_limit > 1000 {
            return Err(ConfigError::Invalid {
                field: "symbols.default_limit".into(),
                reason: "must be between 1 and 1000".into(),
            });
        }

        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "db_path".into(),
                hint: "Set SKILLMEAT_DB_PATH environment variable".into(),
            });
        }

        if self.github_api_url.starts_with("http://") {
            tracing::warn!(url = %self.github_api_url, "github_api_url is not using TLS; tokens will be sent in clear text");
        }

        Ok(())
    }
}
