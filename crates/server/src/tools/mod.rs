//! MCP tool implementations.
//!
//! This module contains all tools exposed by the folio-cache server.

pub mod fetch;
pub mod lifecycle;
pub mod list;
pub mod message;

pub use fetch::CacheFetchParams;
pub use list::CacheListParams;

#[cfg(test)]
pub(crate) async fn test_worker() -> folio_client::CacheWorker {
    use folio_client::{FetchConfig, HttpFetcher, WorkerConfig};
    use folio_core::{AppConfig, CacheDb};
    use std::sync::Arc;
    use std::time::Duration;

    // Nothing listens on the discard port, so every network call fails fast.
    let app = AppConfig { origin: "http://127.0.0.1:9".into(), precache: Vec::new(), ..Default::default() };
    let config = WorkerConfig::from_app_config(&app).unwrap();
    let db = CacheDb::open_in_memory().await.unwrap();
    let fetcher = HttpFetcher::new(&FetchConfig { timeout: Duration::from_secs(2), ..Default::default() }).unwrap();

    folio_client::CacheWorker::new(config, db, Arc::new(fetcher))
}

#[cfg(test)]
pub(crate) fn tool_output<T: serde::de::DeserializeOwned>(result: &rmcp::model::CallToolResult) -> T {
    let text = result.content.first().and_then(|c| c.as_text()).map(|c| c.text.clone()).unwrap();
    serde_json::from_str(&text).unwrap()
}
