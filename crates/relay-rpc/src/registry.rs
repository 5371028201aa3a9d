//! Method registry and async dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::types::JsonRpcMessage;

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the given params and context.
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError>;
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
    timeout: Duration,
}

impl MethodRegistry {
    /// Maximum time a single handler is allowed to run.
    pub const HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            timeout: Self::HANDLER_TIMEOUT,
        }
    }

    /// Override the handler timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a handler for a method name.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Dispatch a message.
    ///
    /// Requests always produce a `Response` or `Error`. Notifications run their
    /// handler (if any) and produce nothing; responses and errors coming from
    /// the client are accepted and produce nothing.
    pub async fn dispatch(&self, message: JsonRpcMessage, ctx: &RpcContext) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request {
                id, method, params, ..
            } => {
                let outcome = self.invoke(&method, params, ctx).await;
                Some(match outcome {
                    Ok(result) => JsonRpcMessage::response(id, result),
                    Err(err) => JsonRpcMessage::error(id, err.to_error_object()),
                })
            }
            JsonRpcMessage::Notification { method, params, .. } => {
                if self.has_method(&method) {
                    if let Err(err) = self.invoke(&method, params, ctx).await {
                        warn!(method, error = %err, "notification handler failed");
                    }
                } else {
                    debug!(method, "ignoring unhandled notification");
                }
                None
            }
            other => {
                debug!(kind = other.kind(), id = ?other.id(), "ignoring client response");
                None
            }
        }
    }

    async fn invoke(
        &self,
        method: &str,
        params: Option<Value>,
        ctx: &RpcContext,
    ) -> Result<Value, RpcError> {
        counter!("relay_rpc_requests_total", "method" => method.to_owned()).increment(1);

        let Some(handler) = self.handlers.get(method) else {
            counter!("relay_rpc_errors_total", "method" => method.to_owned(), "error_type" => "method_not_found").increment(1);
            return Err(RpcError::MethodNotFound {
                method: method.to_owned(),
            });
        };

        let start = std::time::Instant::now();
        let result = tokio::time::timeout(self.timeout, handler.handle(params, ctx)).await;

        let outcome = match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                counter!("relay_rpc_errors_total", "method" => method.to_owned(), "error_type" => err.code().to_string()).increment(1);
                Err(err)
            }
            Err(_elapsed) => {
                counter!("relay_rpc_errors_total", "method" => method.to_owned(), "error_type" => "timeout").increment(1);
                tracing::error!(method, "RPC handler timed out after {:?}", self.timeout);
                Err(RpcError::Internal {
                    message: format!("Handler for '{method}' timed out"),
                })
            }
        };

        let duration = start.elapsed();
        histogram!("relay_rpc_request_duration_seconds", "method" => method.to_owned())
            .record(duration.as_secs_f64());
        if duration.as_secs() >= 5 {
            warn!(method, duration_secs = duration.as_secs_f64(), "slow RPC request");
        }

        outcome
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
