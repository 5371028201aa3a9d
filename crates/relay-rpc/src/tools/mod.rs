//! Tools callable through `tools/call`.

pub mod image;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

pub use image::ImageGenerationTool;

/// Failure raised by a tool invocation.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The caller's arguments did not match the input schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The upstream service answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },
    /// The request to the upstream service failed.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The upstream answer could not be interpreted.
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// A single content block of a tool result.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Base64-encoded image.
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type of the payload.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Result of a tool call as returned to the client.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolOutput {
    /// Content blocks.
    pub content: Vec<ToolContent>,
    /// Whether the call failed.
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Failed result carrying the error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;
    /// One-line description shown to clients.
    fn description(&self) -> &str;
    /// JSON Schema of the `arguments` object.
    fn input_schema(&self) -> Value;
    /// Run the tool.
    async fn call(&self, arguments: Value) -> Result<ToolOutput, ToolError>;
}

/// Tools indexed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name, replacing any previous one.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let _ = self.tools.insert(tool.name().to_owned(), Arc::new(tool));
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Descriptors in the shape `tools/list` returns, sorted by name.
    pub fn descriptors(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                    "inputSchema": t.input_schema(),
                })
            })
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercase text"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn call(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("text required".into()))?;
            Ok(ToolOutput::text(text.to_uppercase()))
        }
    }

    #[test]
    fn descriptors_use_mcp_field_names() {
        let mut reg = ToolRegistry::new();
        reg.register(Upper);
        let d = reg.descriptors();
        assert_eq!(d.len(), 1);
        assert_eq!(d[0]["name"], "upper");
        assert_eq!(d[0]["inputSchema"]["type"], "object");
    }

    #[tokio::test]
    async fn lookup_and_call() {
        let mut reg = ToolRegistry::new();
        reg.register(Upper);
        let tool = reg.get("upper").unwrap();
        let out = tool.call(json!({"text": "hi"})).await.unwrap();
        assert_eq!(out, ToolOutput::text("HI"));
        assert!(reg.get("lower").is_none());
    }

    #[test]
    fn output_serializes_like_mcp() {
        let v = serde_json::to_value(ToolOutput::error("bad")).unwrap();
        assert_eq!(v, json!({"content": [{"type": "text", "text": "bad"}], "isError": true}));

        let img = ToolOutput {
            content: vec![ToolContent::Image {
                data: "AAA=".into(),
                mime_type: "image/png".into(),
            }],
            is_error: false,
        };
        let v = serde_json::to_value(img).unwrap();
        assert_eq!(v["content"][0]["type"], "image");
        assert_eq!(v["content"][0]["mimeType"], "image/png");
    }

    #[test]
    fn empty_registry() {
        let reg = ToolRegistry::new();
        assert!(reg.is_empty());
        assert_eq!(reg.len(), 0);
        assert!(reg.descriptors().is_empty());
    }
}
