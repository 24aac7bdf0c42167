//! Request routing: eligibility gate and ordered rule matching.
//!
//! A [`RuleSet`] is compiled once from configuration and never mutated.
//! Rules are evaluated in declaration order and the first pattern that
//! matches the absolute request URL wins. Requests that match no rule use
//! the default rule (network-first into the primary partition).

use std::fmt;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigError;

/// Caching algorithm applied to an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Serve from the partition, go to the network only on a miss.
    CacheFirst,
    /// Go to the network, fall back to the partition on failure.
    NetworkFirst,
    /// Serve from the partition and refresh it in the background.
    StaleWhileRevalidate,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::CacheFirst => write!(f, "cache-first"),
            Strategy::NetworkFirst => write!(f, "network-first"),
            Strategy::StaleWhileRevalidate => write!(f, "stale-while-revalidate"),
        }
    }
}

/// Expiration limits for a partition. Either field may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExpirationPolicy {
    /// Maximum number of entries kept in the partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<u32>,

    /// Maximum age of an entry in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_seconds: Option<u64>,
}

impl ExpirationPolicy {
    /// True if neither limit is set.
    pub fn is_empty(&self) -> bool {
        self.max_entries.is_none() && self.max_age_seconds.is_none()
    }
}

/// A caching rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Regular expression matched against the absolute request URL.
    pub pattern: String,
    pub strategy: Strategy,
    /// Target partition name.
    pub partition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<ExpirationPolicy>,
}

impl RuleConfig {
    fn new(pattern: &str, strategy: Strategy, partition: &str, expiration: Option<ExpirationPolicy>) -> Self {
        Self { pattern: pattern.into(), strategy, partition: partition.into(), expiration }
    }
}

const DAY_SECS: u64 = 24 * 60 * 60;

/// The runtime rules shipped with the portfolio site.
pub fn default_rules() -> Vec<RuleConfig> {
    vec![
        RuleConfig::new(
            r"\.(?:png|jpg|jpeg|svg|gif|webp|ico)$",
            Strategy::CacheFirst,
            "images-cache",
            Some(ExpirationPolicy { max_entries: Some(50), max_age_seconds: Some(30 * DAY_SECS) }),
        ),
        RuleConfig::new(
            r"\.(?:js|css)$",
            Strategy::StaleWhileRevalidate,
            "static-resources",
            Some(ExpirationPolicy { max_entries: Some(20), max_age_seconds: Some(7 * DAY_SECS) }),
        ),
        RuleConfig::new(
            r"^https://fonts\.googleapis\.com",
            Strategy::StaleWhileRevalidate,
            "google-fonts-stylesheets",
            None,
        ),
        RuleConfig::new(
            r"^https://fonts\.gstatic\.com",
            Strategy::CacheFirst,
            "google-fonts-webfonts",
            Some(ExpirationPolicy { max_entries: Some(30), max_age_seconds: Some(365 * DAY_SECS) }),
        ),
        RuleConfig::new(
            r"^https://cdn\.tailwindcss\.com",
            Strategy::StaleWhileRevalidate,
            "cdn-resources",
            Some(ExpirationPolicy { max_entries: Some(10), max_age_seconds: Some(DAY_SECS) }),
        ),
    ]
}

/// A compiled caching rule.
#[derive(Debug, Clone)]
pub struct CacheRule {
    /// `None` only for the default rule.
    pattern: Option<Regex>,
    pub strategy: Strategy,
    pub partition: String,
    pub expiration: Option<ExpirationPolicy>,
}

impl CacheRule {
    /// Whether this rule matches the given absolute URL.
    pub fn matches(&self, url: &Url) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(url.as_str()))
    }

    /// True for the fallback rule used when nothing else matches.
    pub fn is_default(&self) -> bool {
        self.pattern.is_none()
    }
}

/// Why a request was not intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    /// Only GET requests are cached.
    NonGetMethod,
    /// Cross-origin host that is not allow-listed.
    CrossOrigin,
}

/// Routing decision for a request.
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    /// Send straight to the network.
    Bypass(BypassReason),
    /// Serve through the cache layer using this rule.
    Intercept(&'a CacheRule),
}

/// Immutable, ordered rule list plus the eligibility gate.
#[derive(Debug, Clone)]
pub struct RuleSet {
    origin: Url,
    allowed_hosts: Vec<String>,
    rules: Vec<CacheRule>,
    default_rule: CacheRule,
}

impl RuleSet {
    /// Compile rules for the given origin.
    ///
    /// The default rule targets `primary_partition` with network-first.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a pattern does not compile or an
    /// expiration limit is zero.
    pub fn compile(
        origin: Url, primary_partition: &str, rules: &[RuleConfig], allowed_hosts: &[String],
    ) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(rules.len());

        for (idx, rule) in rules.iter().enumerate() {
            let pattern = Regex::new(&rule.pattern).map_err(|e| ConfigError::Invalid {
                field: format!("rules[{idx}].pattern"),
                reason: e.to_string(),
            })?;

            if rule.partition.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: format!("rules[{idx}].partition"),
                    reason: "must not be empty".into(),
                });
            }

            if let Some(policy) = &rule.expiration {
                if policy.max_entries == Some(0) {
                    return Err(ConfigError::Invalid {
                        field: format!("rules[{idx}].expiration.max_entries"),
                        reason: "must be at least 1".into(),
                    });
                }
                if policy.max_age_seconds == Some(0) {
                    return Err(ConfigError::Invalid {
                        field: format!("rules[{idx}].expiration.max_age_seconds"),
                        reason: "must be at least 1".into(),
                    });
                }
            }

            compiled.push(CacheRule {
                pattern: Some(pattern),
                strategy: rule.strategy,
                partition: rule.partition.clone(),
                expiration: rule.expiration.filter(|p| !p.is_empty()),
            });
        }

        let default_rule = CacheRule {
            pattern: None,
            strategy: Strategy::NetworkFirst,
            partition: primary_partition.to_string(),
            expiration: None,
        };

        Ok(Self {
            origin,
            allowed_hosts: allowed_hosts.iter().map(|h| h.trim().to_ascii_lowercase()).collect(),
            rules: compiled,
            default_rule,
        })
    }

    /// Decide whether a request is intercepted, and by which rule.
    pub fn resolve(&self, method: &str, url: &Url) -> Route<'_> {
        if !method.eq_ignore_ascii_case("GET") {
            return Route::Bypass(BypassReason::NonGetMethod);
        }

        if !self.is_eligible_origin(url) {
            return Route::Bypass(BypassReason::CrossOrigin);
        }

        Route::Intercept(self.match_url(url))
    }

    /// First rule whose pattern matches, or the default rule.
    pub fn match_url(&self, url: &Url) -> &CacheRule {
        self.rules
            .iter()
            .find(|rule| rule.matches(url))
            .unwrap_or(&self.default_rule)
    }

    /// First rule that targets the given partition.
    pub fn rule_for_partition(&self, partition: &str) -> Option<&CacheRule> {
        self.rules.iter().find(|rule| rule.partition == partition)
    }

    /// Same-origin, or cross-origin with an allow-listed host.
    pub fn is_eligible_origin(&self, url: &Url) -> bool {
        if url.origin() == self.origin.origin() {
            return true;
        }

        url.host_str()
            .is_some_and(|host| self.allowed_hosts.iter().any(|allowed| allowed.eq_ignore_ascii_case(host)))
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }
}
