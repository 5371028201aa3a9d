//! Structured JSON-RPC 2.0 messages.
//!
//! Every payload crossing the relay, in either direction, is validated into a
//! [`JsonRpcMessage`] first. Validation rules:
//!
//! - the document is an object with `"jsonrpc": "2.0"`
//! - `id`, when present, is a string or an integer
//! - a `method` makes it a request (with `id`) or a notification (without);
//!   the method is a non-empty string and `params`, if present, is an object
//!   or an array
//! - otherwise it is a response: `id` is required and exactly one of
//!   `result` / `error` is present; `error` carries an integer `code` and a
//!   string `message`
//!
//! Members outside the JSON-RPC envelope are kept and written back out
//! unchanged, so a validated message re-serializes to the document it was
//! parsed from.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Protocol version string carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier: string or integer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id.
    Number(i64),
    /// String id.
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Error member of an error response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details. `Some(Value::Null)` is an explicit
    /// `"data": null`; `None` means the member was absent.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
    /// Members beyond `code`, `message` and `data`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorObject {
    /// Error object without `data` or extra members.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            extra: Map::new(),
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

// Only called when the member exists, so `null` stays `Some(Value::Null)`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Schema violations found while validating a message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The document was not a JSON object.
    #[error("message must be a JSON object")]
    NotAnObject,
    /// `jsonrpc` was missing or not `"2.0"`.
    #[error("jsonrpc must be \"2.0\"")]
    InvalidVersion,
    /// `id` was neither a string nor an integer.
    #[error("id must be a string or an integer")]
    InvalidId,
    /// `method` was not a non-empty string.
    #[error("method must be a non-empty string")]
    InvalidMethod,
    /// `params` was neither an object nor an array.
    #[error("params must be an object or an array")]
    InvalidParams,
    /// A response carried no `id`.
    #[error("response is missing id")]
    MissingId,
    /// A response carried both or neither of `result` and `error`.
    #[error("response must carry exactly one of result or error")]
    InvalidResponse,
    /// The `error` member did not match the error object shape.
    #[error("invalid error object: {0}")]
    InvalidError(String),
}

/// A validated JSON-RPC 2.0 message.
#[derive(Clone, Debug, PartialEq)]
pub enum JsonRpcMessage {
    /// A call expecting a response.
    Request {
        /// Request identifier.
        id: RequestId,
        /// Method name.
        method: String,
        /// Optional parameters.
        params: Option<Value>,
        /// Unrecognized top-level members.
        extra: Map<String, Value>,
    },
    /// A call without a response.
    Notification {
        /// Method name.
        method: String,
        /// Optional parameters.
        params: Option<Value>,
        /// Unrecognized top-level members.
        extra: Map<String, Value>,
    },
    /// A successful result.
    Response {
        /// Identifier of the answered request.
        id: RequestId,
        /// Result payload.
        result: Value,
        /// Unrecognized top-level members.
        extra: Map<String, Value>,
    },
    /// A failed result.
    Error {
        /// Identifier of the answered request.
        id: RequestId,
        /// Error details.
        error: ErrorObject,
        /// Unrecognized top-level members.
        extra: Map<String, Value>,
    },
}

impl JsonRpcMessage {
    /// Build a request.
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request {
            id: id.into(),
            method: method.into(),
            params,
            extra: Map::new(),
        }
    }

    /// Build a notification.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification {
            method: method.into(),
            params,
            extra: Map::new(),
        }
    }

    /// Build a success response.
    pub fn response(id: RequestId, result: Value) -> Self {
        Self::Response {
            id,
            result,
            extra: Map::new(),
        }
    }

    /// Build an error response.
    pub fn error(id: RequestId, error: ErrorObject) -> Self {
        Self::Error {
            id,
            error,
            extra: Map::new(),
        }
    }

    /// Parse and validate raw JSON text.
    pub fn from_json(text: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Validate an already-parsed JSON document.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let Value::Object(mut obj) = value else {
            return Err(MessageError::NotAnObject);
        };

        if obj.remove("jsonrpc").as_ref().and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(MessageError::InvalidVersion);
        }

        let id = match obj.remove("id") {
            None => None,
            Some(Value::String(s)) => Some(RequestId::String(s)),
            Some(Value::Number(n)) => Some(RequestId::Number(
                n.as_i64().ok_or(MessageError::InvalidId)?,
            )),
            Some(_) => return Err(MessageError::InvalidId),
        };

        if let Some(method) = obj.remove("method") {
            let method = match method {
                Value::String(m) if !m.is_empty() => m,
                _ => return Err(MessageError::InvalidMethod),
            };
            let params = take_params(&mut obj)?;
            return Ok(match id {
                Some(id) => Self::Request {
                    id,
                    method,
                    params,
                    extra: obj,
                },
                None => Self::Notification {
                    method,
                    params,
                    extra: obj,
                },
            });
        }

        let id = id.ok_or(MessageError::MissingId)?;
        match (obj.remove("result"), obj.remove("error")) {
            (Some(result), None) => Ok(Self::Response {
                id,
                result,
                extra: obj,
            }),
            (None, Some(error)) => {
                let error: ErrorObject = serde_json::from_value(error)
                    .map_err(|e| MessageError::InvalidError(e.to_string()))?;
                Ok(Self::Error {
                    id,
                    error,
                    extra: obj,
                })
            }
            _ => Err(MessageError::InvalidResponse),
        }
    }

    /// Serialize to compact JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            Self::Response { .. } | Self::Error { .. } => None,
        }
    }

    /// Identifier for requests and responses.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } | Self::Error { id, .. } => {
                Some(id)
            }
            Self::Notification { .. } => None,
        }
    }

    /// Top-level members outside the JSON-RPC envelope.
    pub fn extra(&self) -> &Map<String, Value> {
        match self {
            Self::Request { extra, .. }
            | Self::Notification { extra, .. }
            | Self::Response { extra, .. }
            | Self::Error { extra, .. } => extra,
        }
    }

    /// Short name of the message kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Notification { .. } => "notification",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
        }
    }
}

fn take_params(obj: &mut Map<String, Value>) -> Result<Option<Value>, MessageError> {
    match obj.remove("params") {
        None => Ok(None),
        Some(p @ (Value::Object(_) | Value::Array(_))) => Ok(Some(p)),
        Some(_) => Err(MessageError::InvalidParams),
    }
}

#[derive(Serialize)]
struct Wire<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorObject>,
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

impl Serialize for JsonRpcMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut wire = Wire {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
            extra: self.extra(),
        };
        match self {
            Self::Request {
                id, method, params, ..
            } => {
                wire.id = Some(id);
                wire.method = Some(method);
                wire.params = params.as_ref();
            }
            Self::Notification { method, params, .. } => {
                wire.method = Some(method);
                wire.params = params.as_ref();
            }
            Self::Response { id, result, .. } => {
                wire.id = Some(id);
                wire.result = Some(result);
            }
            Self::Error { id, error, .. } => {
                wire.id = Some(id);
                wire.error = Some(error);
            }
        }
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}
