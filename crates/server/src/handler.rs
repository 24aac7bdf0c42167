//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the cache worker.
use std::sync::Arc;

use folio_client::{AdminMessage, CacheWorker};

use crate::tools::{
    CacheFetchParams, CacheListParams,
    fetch::fetch_impl,
    lifecycle::{activate_impl, install_impl, maintain_impl},
    list::list_impl,
    message::message_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for folio-cache.
#[derive(Clone)]
pub struct FolioCacheServer {
    worker: Arc<CacheWorker>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl FolioCacheServer {
    /// Create a new server handler around a shared worker.
    pub fn new(worker: Arc<CacheWorker>) -> Self {
        Self { worker, tool_router: Self::tool_router() }
    }

    /// Issue a request through the offline cache layer.
    #[tool(
        description = "Fetch a URL through the offline cache. Reports whether the response came from the network, the cache, or an offline fallback."
    )]
    async fn cache_fetch(&self, params: Parameters<CacheFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    /// Deliver an administrative message.
    #[tool(description = "Send an admin message to the cache worker: SKIP_WAITING, GET_VERSION, or CLEAR_CACHE.")]
    async fn cache_message(&self, params: Parameters<AdminMessage>) -> Result<CallToolResult, McpError> {
        message_impl(&self.worker, params.0).await
    }

    #[tool(description = "Precache the manifest into the current version's partition. Fails without writing anything if any URL fails.")]
    async fn cache_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.worker).await
    }

    #[tool(description = "Activate the installed version: delete partitions of older versions and take control of clients.")]
    async fn cache_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.worker).await
    }

    #[tool(description = "Enforce expiration policies on every cache partition now.")]
    async fn cache_maintain(&self) -> Result<CallToolResult, McpError> {
        maintain_impl(&self.worker).await
    }

    /// List partitions or the keys of one partition.
    #[tool(description = "List cache partitions with entry counts, or the entry keys of one partition.")]
    async fn cache_list(&self, params: Parameters<CacheListParams>) -> Result<CallToolResult, McpError> {
        list_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for FolioCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "folio-cache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
