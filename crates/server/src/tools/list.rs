//! cache_list tool implementation.
//!
//! Lists partitions, or the entry keys of one partition.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use folio_client::CacheWorker;
use folio_core::Error;
use folio_core::cache::{EntryKey, PartitionInfo};

/// Parameters for the cache_list tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheListParams {
    /// List the keys of this partition instead of the partitions.
    #[serde(default)]
    pub partition: Option<String>,
}

/// Output from the cache_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CacheListOutput {
    Partitions { version: String, partitions: Vec<PartitionInfo> },
    Keys { partition: String, keys: Vec<EntryKey> },
}

/// Implementation of the cache_list tool.
pub async fn list_impl(worker: &CacheWorker, params: CacheListParams) -> Result<CallToolResult, McpError> {
    let output = match params.partition {
        Some(partition) => {
            let keys = worker.keys(&partition).await?;
            CacheListOutput::Keys { partition, keys }
        }
        None => CacheListOutput::Partitions {
            version: worker.version().to_string(),
            partitions: worker.partitions().await?,
        },
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize listing: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
