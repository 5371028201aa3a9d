//! Tool handlers: list, call.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{instrument, warn};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::handlers::{require_param, require_string_param};
use crate::registry::MethodHandler;
use crate::tools::ToolOutput;

/// Lists registered tools.
pub struct ListToolsHandler;

#[async_trait]
impl MethodHandler for ListToolsHandler {
    #[instrument(skip_all, fields(method = "tools/list"))]
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!({ "tools": ctx.tools.descriptors() }))
    }
}

/// Invokes a tool by name.
///
/// Tool failures are reported as `isError: true` results rather than
/// JSON-RPC errors; only an unknown tool or malformed params are errors.
pub struct CallToolHandler;

#[async_trait]
impl MethodHandler for CallToolHandler {
    #[instrument(skip_all, fields(method = "tools/call"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let name = require_string_param(params.as_ref(), "name")?;
        let arguments = match require_param(params.as_ref(), "arguments") {
            Ok(v) => v.clone(),
            Err(_) => json!({}),
        };

        let tool = ctx.tools.get(name).ok_or_else(|| RpcError::InvalidParams {
            message: format!("Unknown tool: {name}"),
        })?;

        let output = match tool.call(arguments).await {
            Ok(output) => output,
            Err(err) => {
                warn!(tool = name, error = %err, "tool call failed");
                ToolOutput::error(err.to_string())
            }
        };

        serde_json::to_value(output).map_err(|e| RpcError::Internal {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::errors::INVALID_PARAMS;
    use crate::tools::{Tool, ToolError, ToolRegistry};

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo arguments"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn call(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(arguments.to_string()))
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn call(&self, _arguments: Value) -> Result<ToolOutput, ToolError> {
            Err(ToolError::Decode("nope".into()))
        }
    }

    fn ctx() -> RpcContext {
        let mut tools = ToolRegistry::new();
        tools.register(Echo);
        tools.register(Broken);
        RpcContext {
            tools: Arc::new(tools),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn list_returns_descriptors() {
        let result = ListToolsHandler.handle(None, &ctx()).await.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], "broken");
        assert_eq!(tools[1]["name"], "echo");
    }

    #[tokio::test]
    async fn call_runs_tool() {
        let params = json!({"name": "echo", "arguments": {"a": 1}});
        let result = CallToolHandler.handle(Some(params), &ctx()).await.unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["text"], r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn call_defaults_arguments_to_empty_object() {
        let params = json!({"name": "echo"});
        let result = CallToolHandler.handle(Some(params), &ctx()).await.unwrap();
        assert_eq!(result["content"][0]["text"], "{}");
    }

    #[tokio::test]
    async fn tool_failure_is_error_result() {
        let params = json!({"name": "broken"});
        let result = CallToolHandler.handle(Some(params), &ctx()).await.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let params = json!({"name": "missing"});
        let err = CallToolHandler.handle(Some(params), &ctx()).await.unwrap_err();
        assert_eq!(err.code(), INVALID_PARAMS);
    }

    #[tokio::test]
    async fn missing_name_is_invalid_params() {
        let err = CallToolHandler.handle(None, &ctx()).await.unwrap_err();
        assert_eq!(err.code(), INVALID_PARAMS);
    }
}
