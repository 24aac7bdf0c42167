//! Network access for the cache layer.
//!
//! ### Failure semantics
//! - A [`Fetcher`] returns `Err` only when no response was obtained at all
//!   (connection refused, DNS failure, timeout, truncated body).
//! - Non-2xx responses are returned as `Ok`; strategies decide whether to
//!   store them (they never do).
//!
//! ### URL resolution
//! - Relative request URLs resolve against the site origin.
//! - Fragments are removed, the query string is preserved.

pub mod request;
pub mod response;
pub mod url;

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};

pub use request::{Destination, Request};
pub use response::{Response, ResponseSource};
pub use self::url::{UrlError, resolve};

use folio_core::{AppConfig, Error};

/// Source of network responses.
///
/// Implemented over reqwest for production; tests substitute a scripted
/// fetcher.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request against the network.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "folio-cache/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "folio-cache/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), ..Default::default() }
    }
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: &FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();

        let response = self
            .http
            .request(request.method.clone(), request.url.as_str())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Network(format!("timeout fetching {}", request.url))
                } else {
                    Error::Network(format!("network error: {e}"))
                }
            })?;

        let status = response.status();
        let headers = response.headers().clone();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;

        tracing::debug!(
            url = %request.url,
            status = status.as_u16(),
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched from network"
        );

        Ok(Response::new(request.url.clone(), status, headers, body, ResponseSource::Network))
    }
}
