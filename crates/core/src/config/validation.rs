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
    /// - `origin` is not an http(s) URL
    /// - `version_tag` does not start with `partition_prefix`
    /// - a rule pattern does not compile or an expiration limit is 0
    /// - a precache path cannot be resolved
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    ///
    /// Returns `ConfigError::Missing` if `partition_prefix` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition_prefix.is_empty() {
            return Err(ConfigError::Missing {
                field: "partition_prefix".into(),
                hint: "Set FOLIO_CACHE_PARTITION_PREFIX, e.g. \"portfolio-\"".into(),
            });
        }

        if !self.version_tag.starts_with(&self.partition_prefix) || self.version_tag == self.partition_prefix {
            return Err(ConfigError::Invalid {
                field: "version_tag".into(),
                reason: format!("must start with \"{}\" and name a version", self.partition_prefix),
            });
        }

        self.rule_set()?;
        self.precache_urls()?;

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.rules.iter().any(|rule| rule.partition == self.version_tag) {
            tracing::warn!(
                version_tag = %self.version_tag,
                "a runtime rule targets the primary partition; it will be cleared with it on the next version"
            );
        }

        if self.precache.is_empty() {
            tracing::warn!("precache manifest is empty; install only creates the primary partition lazily");
        }

        Ok(())
    }
}
