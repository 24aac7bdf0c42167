//! Caching strategies.
//!
//! Each strategy answers a request from a partition and/or the network:
//!
//! - **cache-first**: cached entry if present, otherwise network (stored on
//!   2xx), otherwise the offline fallback.
//! - **network-first**: network (stored on 2xx); on a network failure the
//!   cached entry, otherwise the offline fallback.
//! - **stale-while-revalidate**: cached entry immediately while a detached
//!   task refreshes the partition; on a miss the caller waits for that
//!   refresh, falling back offline if it fails.
//!
//! Non-2xx network responses are returned untouched and never stored.
//! Every write first applies the rule's expiration policy.
//!
//! Store failures never reach the page: an unreadable entry counts as a
//! miss and a failed write still returns the network response.

use std::sync::Arc;

use folio_core::cache::now_millis;
use folio_core::{CacheDb, CacheRule, Error, ExpirationPolicy, Strategy};

use crate::fallback::OfflineFallback;
use crate::fetch::{Fetcher, Request, Response};

/// Runs the caching strategy selected by a rule.
///
/// Cloning is cheap; clones share the store and the fetcher.
#[derive(Clone)]
pub struct StrategyExecutor {
    db: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    fallback: Arc<OfflineFallback>,
}

impl StrategyExecutor {
    pub fn new(db: CacheDb, fetcher: Arc<dyn Fetcher>, fallback: OfflineFallback) -> Self {
        Self { db, fetcher, fallback: Arc::new(fallback) }
    }

    /// Answer `request` according to `rule`.
    ///
    /// Always produces a response: the network's, a cached one or the
    /// offline fallback.
    pub async fn execute(&self, request: &Request, rule: &CacheRule) -> Response {
        let policy = rule.expiration.as_ref();
        tracing::trace!(url = %request.url, strategy = %rule.strategy, partition = %rule.partition, "executing strategy");

        match rule.strategy {
            Strategy::CacheFirst => self.cache_first(request, &rule.partition, policy).await,
            Strategy::NetworkFirst => self.network_first(request, &rule.partition, policy).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request, &rule.partition, policy).await,
        }
    }

    /// Offline placeholder for `request`.
    pub fn fallback(&self, request: &Request) -> Response {
        self.fallback.respond(request)
    }

    async fn cache_first(
        &self, request: &Request, partition: &str, policy: Option<&ExpirationPolicy>,
    ) -> Response {
        if let Some(cached) = self.lookup(request, partition).await {
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store_logged(request, partition, policy, &response).await;
                }
                response
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "network request failed, no cache available");
                self.fallback(request)
            }
        }
    }

    async fn network_first(
        &self, request: &Request, partition: &str, policy: Option<&ExpirationPolicy>,
    ) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store_logged(request, partition, policy, &response).await;
                }
                response
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "network request failed, trying cache");
                match self.lookup(request, partition).await {
                    Some(cached) => cached,
                    None => self.fallback(request),
                }
            }
        }
    }

    async fn stale_while_revalidate(
        &self, request: &Request, partition: &str, policy: Option<&ExpirationPolicy>,
    ) -> Response {
        let cached = self.lookup(request, partition).await;

        // Detached: dropping the handle below does not cancel the refresh.
        let refresh = {
            let this = self.clone();
            let request = request.clone();
            let partition = partition.to_string();
            let policy = policy.copied();
            tokio::spawn(async move { this.revalidate(&request, &partition, policy.as_ref()).await })
        };

        if let Some(cached) = cached {
            return cached;
        }

        match refresh.await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => self.fallback(request),
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "revalidation task aborted");
                self.fallback(request)
            }
        }
    }

    /// Background half of stale-while-revalidate.
    async fn revalidate(
        &self, request: &Request, partition: &str, policy: Option<&ExpirationPolicy>,
    ) -> Result<Response, Error> {
        let response = self.fetcher.fetch(request).await.inspect_err(|e| {
            tracing::warn!(url = %request.url, error = %e, "background network request failed");
        })?;

        if response.is_success() {
            self.store_logged(request, partition, policy, &response).await;
        }

        Ok(response)
    }

    /// Cached response for `request`. Unreadable entries are dropped and
    /// reported as a miss.
    async fn lookup(&self, request: &Request, partition: &str) -> Option<Response> {
        let method = request.method.as_str();
        let url = request.url.as_str();

        let entry = match self.db.get_entry(partition, method, url).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(url, partition, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match Response::from_entry(entry) {
            Ok(response) => {
                tracing::debug!(url, partition, "cache hit");
                Some(response)
            }
            Err(e) => {
                tracing::warn!(url, partition, error = %e, "discarding unreadable cache entry");
                if let Err(e) = self.db.delete_entry(partition, method, url).await {
                    tracing::warn!(url, partition, error = %e, "failed to delete unreadable cache entry");
                }
                None
            }
        }
    }

    async fn store_logged(
        &self, request: &Request, partition: &str, policy: Option<&ExpirationPolicy>, response: &Response,
    ) {
        if let Err(e) = self.store(request, partition, policy, response).await {
            tracing::warn!(url = %request.url, partition, error = %e, "failed to store response");
        }
    }

    async fn store(
        &self, request: &Request, partition: &str, policy: Option<&ExpirationPolicy>, response: &Response,
    ) -> Result<(), Error> {
        let now = now_millis();

        if let Some(policy) = policy {
            self.db.enforce_expiration(partition, policy, now).await?;
        }

        let entry = response.to_entry(request.method.as_str(), now);
        self.db.put_entry(partition, &entry).await?;
        tracing::debug!(url = %request.url, partition, "stored response");
        Ok(())
    }
}
