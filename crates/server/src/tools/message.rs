//! cache_message tool implementation.
//!
//! Delivers an administrative message (`SKIP_WAITING`, `GET_VERSION`,
//! `CLEAR_CACHE`) to the worker.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use folio_client::{AdminCommand, AdminMessage, AdminReply, CacheWorker};
use folio_core::Error;

/// Output from the cache_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheMessageOutput {
    /// Reply of the worker; absent for messages that have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<AdminReply>,
}

/// Implementation of the cache_message tool.
pub async fn message_impl(worker: &CacheWorker, message: AdminMessage) -> Result<CallToolResult, McpError> {
    let command = AdminCommand::try_from(message)?;
    tracing::debug!(?command, "admin message");

    let output = CacheMessageOutput { reply: worker.handle_message(command).await };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize reply: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
