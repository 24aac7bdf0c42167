//! Cache worker: the controller behind every intercepted request.
//!
//! A worker owns one cache version. It precaches the manifest on
//! [`install`](CacheWorker::install), removes partitions of older versions
//! on [`activate`](CacheWorker::activate), answers administrative messages
//! and trims partitions during maintenance.
//!
//! ### Request handling
//! - Non-GET and non-eligible cross-origin requests bypass the cache.
//! - Everything else is served by the strategy of the first matching rule.
//! - The page always gets a response: unreadable entries count as misses,
//!   failed writes are logged, and the offline fallback covers the rest.

pub mod admin;
pub mod lifecycle;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::try_join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use url::Url;

use folio_core::cache::{EntryKey, PartitionInfo, now_millis};
use folio_core::rules::BypassReason;
use folio_core::{AppConfig, CacheDb, ConfigError, Error, Route, RuleSet};

pub use admin::{AdminCommand, AdminMessage, AdminReply};
pub use lifecycle::{Lifecycle, WorkerState};

use crate::fallback::OfflineFallback;
use crate::fetch::{Fetcher, Request, Response};
use crate::strategy::StrategyExecutor;

/// Immutable settings of one cache version.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Primary partition name.
    pub version_tag: String,
    /// Prefix shared by every version's primary partition.
    pub partition_prefix: String,
    pub precache: Vec<Url>,
    pub rules: RuleSet,
    pub offline_page_title: String,
}

impl WorkerConfig {
    /// Derive worker settings from the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin, a rule or a precache
    /// entry is invalid.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            version_tag: config.version_tag.clone(),
            partition_prefix: config.partition_prefix.clone(),
            precache: config.precache_urls()?,
            rules: config.rule_set()?,
            offline_page_title: config.offline_page_title.clone(),
        })
    }
}

/// Outcome of intercepting a request.
#[derive(Debug)]
pub enum Interception {
    /// Not handled by the cache layer; the caller goes to the network.
    Bypass(BypassReason),
    Respond(Response),
}

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InstallReport {
    pub version: String,
    /// Number of manifest entries written.
    pub precached: usize,
}

/// Result of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ActivationReport {
    pub version: String,
    /// Partitions of older versions that were removed.
    pub deleted: Vec<String>,
}

/// Per-partition outcome of a maintenance pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PartitionMaintenance {
    pub partition: String,
    pub expired: u64,
    pub evicted: u64,
}

/// Result of a maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MaintenanceReport {
    pub partitions: Vec<PartitionMaintenance>,
    /// Partitions whose enforcement failed.
    pub failed: Vec<String>,
}

impl MaintenanceReport {
    pub fn removed(&self) -> u64 {
        self.partitions.iter().map(|p| p.expired + p.evicted).sum()
    }
}

/// Offline cache controller for one version.
pub struct CacheWorker {
    config: Arc<WorkerConfig>,
    db: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    executor: StrategyExecutor,
    lifecycle: RwLock<Lifecycle>,
}

impl CacheWorker {
    pub fn new(config: WorkerConfig, db: CacheDb, fetcher: Arc<dyn Fetcher>) -> Self {
        let fallback = OfflineFallback::new(&config.offline_page_title);
        let executor = StrategyExecutor::new(db.clone(), fetcher.clone(), fallback);
        Self { config: Arc::new(config), db, fetcher, executor, lifecycle: RwLock::new(Lifecycle::default()) }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version_tag
    }

    /// Current lifecycle snapshot.
    pub async fn state(&self) -> Lifecycle {
        *self.lifecycle.read().await
    }

    pub async fn ready_to_activate(&self) -> bool {
        self.lifecycle.read().await.ready_to_activate()
    }

    /// Route a request through the cache layer.
    pub async fn intercept(&self, request: &Request) -> Interception {
        let rule = match self.config.rules.resolve(request.method.as_str(), &request.url) {
            Route::Bypass(reason) => {
                tracing::trace!(url = %request.url, method = %request.method, ?reason, "bypassing cache");
                return Interception::Bypass(reason);
            }
            Route::Intercept(rule) => rule,
        };

        Interception::Respond(self.executor.execute(request, rule).await)
    }

    /// Answer a request the way the page sees it: bypassed requests go
    /// straight to the network.
    ///
    /// # Errors
    ///
    /// Returns `Error::Network` only for a bypassed request whose network
    /// call failed.
    pub async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        match self.intercept(request).await {
            Interception::Respond(response) => Ok(response),
            Interception::Bypass(_) => self.passthrough(request).await,
        }
    }

    /// Send a request to the network without consulting the cache.
    ///
    /// # Errors
    ///
    /// Returns `Error::Network` if no response was obtained.
    pub async fn passthrough(&self, request: &Request) -> Result<Response, Error> {
        self.fetcher.fetch(request).await
    }

    /// Precache the manifest into the primary partition.
    ///
    /// All manifest URLs are fetched concurrently and written in one
    /// transaction. Any failure leaves the store untouched.
    ///
    /// # Errors
    ///
    /// Returns `Error::InstallFailed` when a manifest URL cannot be fetched
    /// or answers non-2xx, or the batch cannot be written.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.lifecycle.write().await.begin_install()?;
        tracing::info!(version = %self.config.version_tag, urls = self.config.precache.len(), "installing");

        match self.precache().await {
            Ok(precached) => {
                self.lifecycle.write().await.complete_install();
                tracing::info!(version = %self.config.version_tag, precached, "install complete");
                Ok(InstallReport { version: self.config.version_tag.clone(), precached })
            }
            Err(e) => {
                self.lifecycle.write().await.fail_install();
                tracing::error!(version = %self.config.version_tag, error = %e, "install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        let captured_at = now_millis();

        let fetches = self.config.precache.iter().map(|url| async move {
            let request = Request::get(url.clone());
            let response = self
                .fetcher
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed(format!("{url}: {e}")))?;

            if !response.is_success() {
                return Err(Error::InstallFailed(format!("{url}: status {}", response.status.as_u16())));
            }

            Ok(response.to_entry(request.method.as_str(), captured_at))
        });

        let entries = try_join_all(fetches).await?;
        let count = entries.len();

        self.db
            .put_entries(&self.config.version_tag, entries)
            .await
            .map_err(|e| Error::InstallFailed(format!("writing precache: {e}")))?;

        Ok(count)
    }

    /// Remove partitions of older versions and claim clients.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` when the worker is not installed, or a
    /// store error if a partition cannot be removed.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        self.lifecycle.write().await.begin_activate()?;

        match self.remove_stale_partitions().await {
            Ok(deleted) => {
                self.lifecycle.write().await.complete_activate();
                tracing::info!(version = %self.config.version_tag, deleted = deleted.len(), "activated");
                Ok(ActivationReport { version: self.config.version_tag.clone(), deleted })
            }
            Err(e) => {
                self.lifecycle.write().await.fail_activate();
                tracing::error!(version = %self.config.version_tag, error = %e, "activation failed");
                Err(e)
            }
        }
    }

    async fn remove_stale_partitions(&self) -> Result<Vec<String>, Error> {
        let stale = self
            .db
            .partitions()
            .await?
            .into_iter()
            .filter(|name| name.starts_with(&self.config.partition_prefix) && *name != self.config.version_tag);

        self.remove_partitions(stale).await
    }

    /// Delete the given partitions, returning the ones that were present.
    async fn remove_partitions(&self, names: impl IntoIterator<Item = String>) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();

        for name in names {
            if self.db.delete_partition(&name).await? {
                tracing::info!(partition = %name, "deleted stale partition");
                deleted.push(name);
            }
        }

        Ok(deleted)
    }

    /// Handle an administrative command. Failures are reported in the reply.
    pub async fn handle_message(&self, command: AdminCommand) -> Option<AdminReply> {
        match command {
            AdminCommand::SkipWaiting => {
                self.lifecycle.write().await.skip_waiting();
                None
            }
            AdminCommand::GetVersion => Some(AdminReply::Version { version: self.config.version_tag.clone() }),
            AdminCommand::ClearCache { cache_name } => {
                let name = cache_name.unwrap_or_else(|| self.config.version_tag.clone());
                let error = match self.db.delete_partition(&name).await {
                    Ok(true) => {
                        tracing::info!(partition = %name, "cleared partition");
                        None
                    }
                    Ok(false) => Some(Error::PartitionNotFound(name).to_string()),
                    Err(e) => {
                        tracing::warn!(partition = %name, error = %e, "failed to clear partition");
                        Some(e.to_string())
                    }
                };
                Some(AdminReply::ClearCache { success: error.is_none(), error })
            }
        }
    }

    /// Enforce expiration on every partition that has a policy.
    ///
    /// Best effort: a failing partition is logged and skipped.
    pub async fn maintain(&self, now_ms: i64) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        let partitions = match self.db.partitions().await {
            Ok(partitions) => partitions,
            Err(e) => {
                tracing::warn!(error = %e, "maintenance could not list partitions");
                return report;
            }
        };

        for name in partitions {
            let Some(policy) = self.config.rules.rule_for_partition(&name).and_then(|rule| rule.expiration) else {
                continue;
            };

            match self.db.enforce_expiration(&name, &policy, now_ms).await {
                Ok(result) => {
                    if result.total() > 0 {
                        tracing::debug!(partition = %name, expired = result.expired, evicted = result.evicted, "trimmed partition");
                    }
                    report.partitions.push(PartitionMaintenance {
                        partition: name,
                        expired: result.expired,
                        evicted: result.evicted,
                    });
                }
                Err(e) => {
                    tracing::warn!(partition = %name, error = %e, "expiration failed");
                    report.failed.push(name);
                }
            }
        }

        report
    }

    /// Run [`maintain`](Self::maintain) every `period` until the handle is
    /// aborted. The first pass runs after one full period.
    ///
    /// Returns `None` for a zero period, which disables maintenance.
    pub fn spawn_maintenance(self: Arc<Self>, period: Duration) -> Option<JoinHandle<()>> {
        if period.is_zero() {
            tracing::debug!("periodic maintenance disabled");
            return None;
        }

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let report = self.maintain(now_millis()).await;
                tracing::info!(removed = report.removed(), failed = report.failed.len(), "maintenance pass");
            }
        }))
    }

    /// Partitions with their entry counts.
    pub async fn partitions(&self) -> Result<Vec<PartitionInfo>, Error> {
        self.db.partition_stats().await
    }

    /// Keys stored in a partition, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `Error::PartitionNotFound` if the partition doesn't exist.
    pub async fn keys(&self, partition: &str) -> Result<Vec<EntryKey>, Error> {
        if !self.db.has_partition(partition).await? {
            return Err(Error::PartitionNotFound(partition.to_string()));
        }
        self.db.entry_keys(partition).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Destination, ResponseSource};
    use crate::testing::MockFetcher;
    use reqwest::Method;

    const ORIGIN: &str = "https://portfolio.example";

    fn config(precache: &[&str]) -> WorkerConfig {
        let app = AppConfig {
            origin: ORIGIN.into(),
            precache: precache.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        };
        WorkerConfig::from_app_config(&app).unwrap()
    }

    async fn worker(precache: &[&str]) -> (CacheWorker, Arc<MockFetcher>, CacheDb) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        let worker = CacheWorker::new(config(precache), db.clone(), fetcher.clone());
        (worker, fetcher, db)
    }

    fn url(path: &str) -> Url {
        Url::parse(&format!("{ORIGIN}{path}")).unwrap()
    }

    #[tokio::test]
    async fn test_install_precaches_manifest() {
        let (worker, fetcher, db) = worker(&["/", "/index.html", "/data/data.json"]).await;
        for path in ["/", "/index.html", "/data/data.json"] {
            fetcher.respond(url(path).as_str(), 200, path);
        }

        let report = worker.install().await.unwrap();
        assert_eq!(report.precached, 3);
        assert_eq!(report.version, "portfolio-v1.0.0");
        assert_eq!(db.count_entries("portfolio-v1.0.0").await.unwrap(), 3);
        assert_eq!(fetcher.calls(), 3);

        let state = worker.state().await;
        assert_eq!(state.phase, WorkerState::Installed);
        assert!(worker.ready_to_activate().await);
    }

    #[tokio::test]
    async fn test_install_failure_writes_nothing() {
        let (worker, fetcher, db) = worker(&["/", "/index.html", "/data/data.json"]).await;
        fetcher.respond(url("/").as_str(), 200, "home");
        fetcher.respond(url("/index.html").as_str(), 200, "index");
        fetcher.respond(url("/data/data.json").as_str(), 404, "missing");

        let err = worker.install().await.unwrap_err();
        assert!(matches!(err, Error::InstallFailed(_)));
        assert!(!db.has_partition("portfolio-v1.0.0").await.unwrap());
        assert_eq!(worker.state().await.phase, WorkerState::Parsed);
        assert!(worker.activate().await.is_err());
    }

    #[tokio::test]
    async fn test_install_network_failure() {
        let (worker, fetcher, db) = worker(&["/", "/index.html"]).await;
        fetcher.respond(url("/").as_str(), 200, "home");
        fetcher.fail(url("/index.html").as_str());

        assert!(matches!(worker.install().await, Err(Error::InstallFailed(_))));
        assert!(db.partitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activate_removes_old_versions_only() {
        let (worker, fetcher, db) = worker(&["/"]).await;
        fetcher.respond(url("/").as_str(), 200, "home");

        for partition in ["portfolio-v0.9.0", "images-cache"] {
            let entry = folio_core::CacheEntry::new("GET", url("/old.png").as_str(), 200, "OK", vec![], vec![1], 1);
            db.put_entry(partition, &entry).await.unwrap();
        }

        worker.install().await.unwrap();
        let report = worker.activate().await.unwrap();

        assert_eq!(report.deleted, vec!["portfolio-v0.9.0".to_string()]);
        let mut partitions = db.partitions().await.unwrap();
        partitions.sort();
        assert_eq!(partitions, vec!["images-cache".to_string(), "portfolio-v1.0.0".to_string()]);

        let state = worker.state().await;
        assert_eq!(state.phase, WorkerState::Activated);
        assert!(state.controlling);
    }

    #[tokio::test]
    async fn test_intercept_bypasses_non_get_and_foreign_hosts() {
        let (worker, _fetcher, _db) = worker(&[]).await;

        let post = Request::new(Method::POST, url("/api/contact"), Destination::Other);
        assert!(matches!(worker.intercept(&post).await, Interception::Bypass(BypassReason::NonGetMethod)));

        let foreign = Request::get(Url::parse("https://tracker.example/pixel.gif").unwrap());
        assert!(matches!(worker.intercept(&foreign).await, Interception::Bypass(BypassReason::CrossOrigin)));

        let font = Request::get(Url::parse("https://fonts.gstatic.com/s/inter.woff2").unwrap());
        assert!(matches!(worker.intercept(&font).await, Interception::Respond(_)));
    }

    #[tokio::test]
    async fn test_fetch_bypass_goes_to_network() {
        let (worker, fetcher, db) = worker(&[]).await;
        fetcher.respond(url("/api/contact").as_str(), 200, "sent");

        let post = Request::new(Method::POST, url("/api/contact"), Destination::Other);
        let response = worker.fetch(&post).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert!(db.partitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_precached_page_served_offline() {
        let (worker, fetcher, _db) = worker(&["/index.html"]).await;
        fetcher.respond(url("/index.html").as_str(), 200, "precached");
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        fetcher.fail(url("/index.html").as_str());
        let response = worker.fetch(&Request::get(url("/index.html"))).await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(&response.body[..], b"precached");
    }

    #[tokio::test]
    async fn test_unreadable_entry_falls_through_to_network() {
        let (worker, fetcher, db) = worker(&[]).await;
        let target = url("/asset/new.png");

        let mut corrupt = folio_core::CacheEntry::new("GET", target.as_str(), 200, "OK", vec![], b"old".to_vec(), 1);
        corrupt.url = "::bad::".into();
        db.put_entry("images-cache", &corrupt).await.unwrap();
        fetcher.respond(target.as_str(), 200, "fresh");

        let response = worker.fetch(&Request::get(target.clone())).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(&response.body[..], b"fresh");
        assert_eq!(fetcher.calls_for(target.as_str()), 1);

        let again = worker.fetch(&Request::get(target.clone())).await.unwrap();
        assert_eq!(again.source, ResponseSource::Cache);
        assert_eq!(fetcher.calls_for(target.as_str()), 1);
    }

    #[tokio::test]
    async fn test_passthrough_skips_cache() {
        let (worker, fetcher, db) = worker(&[]).await;
        let target = url("/asset/new.png");
        fetcher.respond(target.as_str(), 200, "direct");

        let response = worker.passthrough(&Request::get(target.clone())).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert!(!db.has_partition("images-cache").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_partitions_reports_only_deleted() {
        let (worker, _fetcher, db) = worker(&[]).await;
        let entry = folio_core::CacheEntry::new("GET", url("/").as_str(), 200, "OK", vec![], vec![], 1);
        db.put_entry("portfolio-v0.9.0", &entry).await.unwrap();

        let deleted = worker
            .remove_partitions(["portfolio-v0.9.0".to_string(), "portfolio-v0.8.0".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, vec!["portfolio-v0.9.0".to_string()]);
    }

    #[tokio::test]
    async fn test_spawn_maintenance_zero_period_disabled() {
        let (worker, _fetcher, _db) = worker(&[]).await;
        assert!(Arc::new(worker).spawn_maintenance(Duration::ZERO).is_none());
    }

    #[tokio::test]
    async fn test_get_version() {
        let (worker, _fetcher, _db) = worker(&[]).await;
        let reply = worker.handle_message(AdminCommand::GetVersion).await;
        assert_eq!(reply, Some(AdminReply::Version { version: "portfolio-v1.0.0".into() }));
    }

    #[tokio::test]
    async fn test_skip_waiting_has_no_reply() {
        let (worker, _fetcher, _db) = worker(&[]).await;
        assert_eq!(worker.handle_message(AdminCommand::SkipWaiting).await, None);
        assert!(worker.state().await.skip_waiting);
    }

    #[tokio::test]
    async fn test_clear_cache_missing_partition() {
        let (worker, _fetcher, _db) = worker(&[]).await;
        let reply = worker
            .handle_message(AdminCommand::ClearCache { cache_name: Some("does-not-exist".into()) })
            .await;

        match reply {
            Some(AdminReply::ClearCache { success, error }) => {
                assert!(!success);
                assert!(error.unwrap().starts_with("PARTITION_NOT_FOUND"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clear_cache_defaults_to_primary() {
        let (worker, fetcher, db) = worker(&["/"]).await;
        fetcher.respond(url("/").as_str(), 200, "home");
        worker.install().await.unwrap();

        let reply = worker.handle_message(AdminCommand::ClearCache { cache_name: None }).await;
        assert_eq!(reply, Some(AdminReply::ClearCache { success: true, error: None }));
        assert!(!db.has_partition("portfolio-v1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_maintain_applies_rule_policies() {
        let (worker, _fetcher, db) = worker(&[]).await;
        let now = now_millis();
        let day_ms = 24 * 60 * 60 * 1000;

        let old = folio_core::CacheEntry::new("GET", url("/old.png").as_str(), 200, "OK", vec![], vec![], now - 31 * day_ms);
        let fresh = folio_core::CacheEntry::new("GET", url("/new.png").as_str(), 200, "OK", vec![], vec![], now);
        db.put_entry("images-cache", &old).await.unwrap();
        db.put_entry("images-cache", &fresh).await.unwrap();

        // No rule targets the primary partition, so it is left alone.
        let ancient = folio_core::CacheEntry::new("GET", url("/").as_str(), 200, "OK", vec![], vec![], 0);
        db.put_entry("portfolio-v1.0.0", &ancient).await.unwrap();

        let report = worker.maintain(now).await;
        assert_eq!(report.removed(), 1);
        assert!(report.failed.is_empty());
        assert_eq!(db.count_entries("images-cache").await.unwrap(), 1);
        assert_eq!(db.count_entries("portfolio-v1.0.0").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_keys_and_partitions() {
        let (worker, fetcher, _db) = worker(&["/", "/index.html"]).await;
        fetcher.respond(url("/").as_str(), 200, "home");
        fetcher.respond(url("/index.html").as_str(), 200, "index");
        worker.install().await.unwrap();

        let partitions = worker.partitions().await.unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].entries, 2);

        assert_eq!(worker.keys("portfolio-v1.0.0").await.unwrap().len(), 2);
        assert!(matches!(worker.keys("nope").await, Err(Error::PartitionNotFound(_))));
    }

    #[tokio::test]
    async fn test_spawn_maintenance_runs_periodically() {
        let (worker, _fetcher, db) = worker(&[]).await;
        let stale = folio_core::CacheEntry::new("GET", url("/a.png").as_str(), 200, "OK", vec![], vec![], 0);
        db.put_entry("images-cache", &stale).await.unwrap();

        let handle = Arc::new(worker).spawn_maintenance(Duration::from_millis(50)).unwrap();

        let mut trimmed = false;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            if db.count_entries("images-cache").await.unwrap() == 0 {
                trimmed = true;
                break;
            }
        }

        assert!(trimmed, "maintenance task should trim expired entries");
        handle.abort();
    }
}
