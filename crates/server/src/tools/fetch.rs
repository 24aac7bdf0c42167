//! cache_fetch tool implementation.
//!
//! Issues a request as the controlled page would and reports how the cache
//! layer answered it.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use folio_client::fetch::resolve;
use folio_client::{CacheWorker, Destination, Interception, Request, Response, ResponseSource};
use folio_core::Error;

/// Input parameters for the cache_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFetchParams {
    /// Absolute URL, or a path relative to the site origin.
    pub url: String,

    /// HTTP method (default: GET). Anything but GET bypasses the cache.
    #[serde(default = "default_method")]
    pub method: String,

    /// Resource type used to pick an offline fallback. Inferred from the
    /// URL when omitted.
    #[serde(default)]
    pub destination: Option<Destination>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for the cache_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFetchOutput {
    /// Absolute request URL.
    pub url: String,
    /// Whether the request went through the cache layer.
    pub intercepted: bool,
    pub source: ResponseSource,
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Body size in bytes.
    pub body_bytes: usize,
    /// Body as text when it is valid UTF-8.
    pub body_text: Option<String>,
}

impl CacheFetchOutput {
    fn new(response: &Response, intercepted: bool) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();

        Self {
            url: response.url.to_string(),
            intercepted,
            source: response.source,
            status: response.status.as_u16(),
            status_text: response.status_text().to_string(),
            content_type: response.content_type().map(String::from),
            headers,
            body_bytes: response.body.len(),
            body_text: std::str::from_utf8(&response.body).ok().map(String::from),
        }
    }
}

/// Implementation of the cache_fetch tool.
pub async fn fetch_impl(worker: &CacheWorker, params: CacheFetchParams) -> Result<CallToolResult, McpError> {
    let url = resolve(&params.url, worker.config().rules.origin()).map_err(Error::from)?;
    let request = Request::parse(&params.method, url, params.destination)?;

    let output = match worker.intercept(&request).await {
        Interception::Respond(response) => CacheFetchOutput::new(&response, true),
        Interception::Bypass(reason) => {
            tracing::debug!(url = %request.url, ?reason, "bypassed request");
            let response = worker.passthrough(&request).await?;
            CacheFetchOutput::new(&response, false)
        }
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize response: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
