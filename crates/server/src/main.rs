//! folio-cache server entry point.
//!
//! Boots the cache worker (install, activate, periodic maintenance) and
//! serves it as an MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

use folio_client::{CacheWorker, FetchConfig, HttpFetcher, WorkerConfig};
use folio_core::{AppConfig, CacheDb};

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(version = %config.version_tag, db = %config.db_path.display(), "Starting folio-cache on stdio transport");

    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let db = CacheDb::open(&config.db_path).await.context("opening cache database")?;
    let fetcher = HttpFetcher::new(&FetchConfig::from(&config))?;
    let worker = Arc::new(CacheWorker::new(WorkerConfig::from_app_config(&config)?, db, Arc::new(fetcher)));

    // A failed install keeps the previously cached version serving.
    match worker.install().await {
        Ok(_) => {
            if worker.ready_to_activate().await
                && let Err(e) = worker.activate().await
            {
                tracing::error!(error = %e, "activation failed");
            }
        }
        Err(e) => tracing::warn!(error = %e, "precache skipped"),
    }

    let maintenance = config.maintenance_interval().and_then(|period| worker.clone().spawn_maintenance(period));

    let handler = handler::FolioCacheServer::new(worker);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    if let Some(task) = maintenance {
        task.abort();
    }

    Ok(())
}
