//! Response model shared by the network, the cache and the fallback generator.

use bytes::Bytes;
use folio_core::cache::CacheEntry;
use folio_core::Error;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Generated offline placeholder.
    Fallback,
}

/// A response handed back to the page.
#[derive(Debug, Clone)]
pub struct Response {
    /// URL of the request this answers.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: Bytes, source: ResponseSource) -> Self {
        Self { url, status, headers, body, source }
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Reason phrase for the status code.
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// Snapshot this response as a cache entry captured at `cached_at`.
    pub fn to_entry(&self, method: &str, cached_at: i64) -> CacheEntry {
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();

        CacheEntry::new(
            method,
            self.url.as_str(),
            self.status.as_u16(),
            self.status_text(),
            headers,
            self.body.to_vec(),
            cached_at,
        )
    }

    /// Rebuild a response from a stored entry.
    ///
    /// Headers that are no longer valid are skipped.
    pub fn from_entry(entry: CacheEntry) -> Result<Self, Error> {
        let url = Url::parse(&entry.url).map_err(|e| Error::CorruptEntry(format!("{}: {e}", entry.url)))?;
        let status = StatusCode::from_u16(entry.status).map_err(|e| Error::CorruptEntry(e.to_string()))?;

        let mut headers = HeaderMap::with_capacity(entry.headers.len());
        for (name, value) in &entry.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::debug!(header = %name, url = %entry.url, "skipping invalid stored header"),
            }
        }

        Ok(Self { url, status, headers, body: Bytes::from(entry.body), source: ResponseSource::Cache })
    }
}
