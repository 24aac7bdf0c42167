//! Administrative message protocol.
//!
//! Messages arrive as `{"type": "...", "payload": {...}}` envelopes and are
//! decoded into an [`AdminCommand`] before they reach the worker.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use folio_core::Error;

/// Wire envelope of an administrative message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdminMessage {
    /// One of `SKIP_WAITING`, `GET_VERSION`, `CLEAR_CACHE`.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearCachePayload {
    cache_name: Option<String>,
}

/// Decoded administrative command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    SkipWaiting,
    GetVersion,
    /// Clear a partition; the primary partition when no name is given.
    ClearCache { cache_name: Option<String> },
}

impl TryFrom<AdminMessage> for AdminCommand {
    type Error = Error;

    fn try_from(message: AdminMessage) -> Result<Self, Self::Error> {
        match message.kind.as_str() {
            "SKIP_WAITING" => Ok(AdminCommand::SkipWaiting),
            "GET_VERSION" => Ok(AdminCommand::GetVersion),
            "CLEAR_CACHE" => {
                let payload = match message.payload {
                    None | Some(Value::Null) => ClearCachePayload::default(),
                    Some(value) => serde_json::from_value(value)
                        .map_err(|e| Error::InvalidInput(format!("invalid CLEAR_CACHE payload: {e}")))?,
                };
                let cache_name = payload.cache_name.filter(|name| !name.trim().is_empty());
                Ok(AdminCommand::ClearCache { cache_name })
            }
            other => Err(Error::InvalidInput(format!("unknown message type: {other}"))),
        }
    }
}

/// Reply to a command that expects one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AdminReply {
    Version {
        version: String,
    },
    ClearCache {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}
