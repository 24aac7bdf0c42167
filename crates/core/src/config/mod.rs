//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FOLIO_CACHE_*)
//! 2. TOML config file (if FOLIO_CACHE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded configuration is static for the life of the process; the
//! worker derives its immutable rule set and precache manifest from it once.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::rules::{RuleConfig, RuleSet, default_rules};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FOLIO_CACHE_*)
/// 2. TOML config file (if FOLIO_CACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache database.
    ///
    /// Set via FOLIO_CACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the controlled site; same-origin requests are always eligible.
    ///
    /// Set via FOLIO_CACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Name of the current primary partition.
    ///
    /// Set via FOLIO_CACHE_VERSION_TAG environment variable.
    #[serde(default = "default_version_tag")]
    pub version_tag: String,

    /// Naming scheme shared by every primary partition version.
    #[serde(default = "default_partition_prefix")]
    pub partition_prefix: String,

    /// Paths (relative to `origin`) stored into the primary partition at install.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Ordered runtime caching rules. First match wins.
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,

    /// Cross-origin hosts that are routed through the cache layer.
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via FOLIO_CACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via FOLIO_CACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Interval of the periodic cache cleanup, 0 disables it.
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,

    /// Title of the generated offline page.
    #[serde(default = "default_offline_page_title")]
    pub offline_page_title: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./folio-cache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_version_tag() -> String {
    "portfolio-v1.0.0".into()
}

fn default_partition_prefix() -> String {
    "portfolio-".into()
}

fn default_precache() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/style/app.css",
        "/js/app.js",
        "/js/data/portfolio-data.js",
        "/js/modules/navigation.js",
        "/js/modules/typing-effect.js",
        "/js/modules/scroll-reveal.js",
        "/js/modules/carousel.js",
        "/js/modules/data-renderer.js",
        "/js/modules/image-optimizer.js",
        "/asset/new.png",
        "/asset/profile-pic.png",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["fonts.googleapis.com".into(), "fonts.gstatic.com".into(), "cdn.tailwindcss.com".into()]
}

fn default_user_agent() -> String {
    "folio-cache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_maintenance_interval_secs() -> u64 {
    60 * 60
}

fn default_offline_page_title() -> String {
    "Offline - Portfolio".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            version_tag: default_version_tag(),
            partition_prefix: default_partition_prefix(),
            precache: default_precache(),
            rules: default_rules(),
            allowed_hosts: default_allowed_hosts(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            offline_page_title: default_offline_page_title(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Maintenance interval, or `None` when periodic cleanup is disabled.
    pub fn maintenance_interval(&self) -> Option<Duration> {
        (self.maintenance_interval_secs > 0).then(|| Duration::from_secs(self.maintenance_interval_secs))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `FOLIO_CACHE_`
    /// 2. TOML file from `FOLIO_CACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FOLIO_CACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FOLIO_CACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parsed site origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin is not an http(s) URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => {
                Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme: {scheme}") })
            }
        }
    }

    /// Compile the runtime rules against the configured origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a bad origin or rule.
    pub fn rule_set(&self) -> Result<RuleSet, ConfigError> {
        RuleSet::compile(self.origin_url()?, &self.version_tag, &self.rules, &self.allowed_hosts)
    }

    /// Precache manifest resolved to absolute URLs, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if an entry cannot be joined to the origin.
    pub fn precache_urls(&self) -> Result<Vec<Url>, ConfigError> {
        let origin = self.origin_url()?;
        self.precache
            .iter()
            .enumerate()
            .map(|(idx, path)| {
                origin
                    .join(path)
                    .map_err(|e| ConfigError::Invalid { field: format!("precache[{idx}]"), reason: e.to_string() })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./folio-cache.sqlite"));
        assert_eq!(config.version_tag, "portfolio-v1.0.0");
        assert_eq!(config.partition_prefix, "portfolio-");
        assert_eq!(config.precache.len(), 13);
        assert_eq!(config.rules.len(), 5);
        assert_eq!(config.allowed_hosts.len(), 3);
        assert_eq!(config.user_agent, "folio-cache/0.1");
        assert_eq!(config.timeout_ms, 20_000);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_maintenance_interval_disabled() {
        let config = AppConfig { maintenance_interval_secs: 0, ..Default::default() };
        assert!(config.maintenance_interval().is_none());
        assert_eq!(AppConfig::default().maintenance_interval(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_precache_urls_resolve_against_origin() {
        let config = AppConfig { origin: "https://portfolio.example".into(), ..Default::default() };
        let urls = config.precache_urls().unwrap();
        assert_eq!(urls[0].as_str(), "https://portfolio.example/");
        assert_eq!(urls[1].as_str(), "https://portfolio.example/index.html");
        assert_eq!(urls.last().unwrap().path(), "/asset/profile-pic.png");
    }

    #[test]
    fn test_origin_rejects_non_http() {
        let config = AppConfig { origin: "file:///var/www".into(), ..Default::default() };
        assert!(matches!(config.origin_url(), Err(ConfigError::Invalid { field, .. }) if field == "origin"));
    }

    #[test]
    fn test_load_from_toml_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "folio.toml",
                r#"
                    version_tag = "portfolio-v2.0.0"
                    precache = ["/", "/index.html"]

                    [[rules]]
                    pattern = '\.png$'
                    strategy = "cache-first"
                    partition = "images-cache"
                    expiration = { max_entries = 5 }
                "#,
            )?;
            jail.set_env("FOLIO_CACHE_CONFIG_FILE", "folio.toml");
            jail.set_env("FOLIO_CACHE_TIMEOUT_MS", "5000");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.version_tag, "portfolio-v2.0.0");
            assert_eq!(config.precache.len(), 2);
            assert_eq!(config.rules.len(), 1);
            assert_eq!(config.rules[0].expiration.unwrap().max_entries, Some(5));
            assert_eq!(config.timeout_ms, 5000);
            Ok(())
        });
    }
}
