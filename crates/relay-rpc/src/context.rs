//! Shared state handed to every method handler.

use std::sync::Arc;

use serde::Serialize;

use crate::tools::ToolRegistry;

/// Name and version reported by `initialize`.
#[derive(Clone, Debug, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "relay".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Dependencies available to handlers.
#[derive(Clone, Default)]
pub struct RpcContext {
    /// Tools exposed through `tools/list` and `tools/call`.
    pub tools: Arc<ToolRegistry>,
    /// Identity reported by `initialize`.
    pub server_info: ServerInfo,
}
