//! # relay-rpc
//!
//! JSON-RPC 2.0 layer carried over the relay:
//!
//! - [`types`]: the structured message model and its schema validation
//! - [`registry`]: method registry and async dispatch
//! - [`handlers`]: `ping`, `initialize`, `tools/list`, `tools/call`
//! - [`tools`]: tool trait, registry, and the image-generation tool

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod tools;
pub mod types;

pub use context::{RpcContext, ServerInfo};
pub use errors::RpcError;
pub use registry::{MethodHandler, MethodRegistry};
pub use types::{ErrorObject, JsonRpcMessage, MessageError, RequestId};
