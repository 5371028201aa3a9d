//! MCP method handlers.

pub mod system;
pub mod tools;

use crate::errors::RpcError;
use crate::registry::MethodRegistry;

/// Register every handler with the registry.
pub fn register_all(registry: &mut MethodRegistry) {
    // Lifecycle
    registry.register("ping", system::PingHandler);
    registry.register("initialize", system::InitializeHandler);
    registry.register("notifications/initialized", system::InitializedHandler);

    // Tools
    registry.register("tools/list", tools::ListToolsHandler);
    registry.register("tools/call", tools::CallToolHandler);
}

/// Extract a required parameter from the params object.
pub(crate) fn require_param<'a>(
    params: Option<&'a serde_json::Value>,
    key: &str,
) -> Result<&'a serde_json::Value, RpcError> {
    params
        .and_then(|p| p.get(key))
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Missing required parameter: {key}"),
        })
}

/// Extract a required string parameter.
pub(crate) fn require_string_param<'a>(
    params: Option<&'a serde_json::Value>,
    key: &str,
) -> Result<&'a str, RpcError> {
    require_param(params, key)?
        .as_str()
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Parameter '{key}' must be a string"),
        })
}
