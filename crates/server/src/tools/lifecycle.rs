//! cache_install, cache_activate and cache_maintain tool implementations.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use folio_client::CacheWorker;
use folio_core::Error;
use folio_core::cache::now_millis;

fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize report: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Precache the manifest into the primary partition.
pub async fn install_impl(worker: &CacheWorker) -> Result<CallToolResult, McpError> {
    let report = worker.install().await?;
    json_result(&report)
}

/// Delete partitions of older versions and claim clients.
pub async fn activate_impl(worker: &CacheWorker) -> Result<CallToolResult, McpError> {
    let report = worker.activate().await?;
    json_result(&report)
}

/// Run one expiration pass over every partition with a policy.
pub async fn maintain_impl(worker: &CacheWorker) -> Result<CallToolResult, McpError> {
    let report = worker.maintain(now_millis()).await;
    json_result(&report)
}
