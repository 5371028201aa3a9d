//! Settings types.
//!
//! Keys are `snake_case` so they line up with `RELAY_`-prefixed environment
//! variables.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// HTTP listener and stream settings.
    pub server: ServerSettings,
    /// Pub/sub broker settings.
    pub broker: BrokerSettings,
    /// Inbound request authorization.
    pub auth: AuthSettings,
    /// Image-generation tool settings.
    pub image: ImageSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// HTTP listener and stream settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Path that opens an event stream.
    pub sse_path: String,
    /// Path that accepts inbound messages; announced to stream clients.
    pub message_path: String,
    /// Largest accepted inbound body, in bytes.
    pub max_body_bytes: usize,
    /// Outbound frames buffered per stream before writes suspend.
    pub stream_buffer: usize,
    /// Seconds between keep-alive comments on idle streams (`0` disables).
    pub keep_alive_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            sse_path: "/sse".to_string(),
            message_path: "/message".to_string(),
            max_body_bytes: 4 * 1024 * 1024,
            stream_buffer: 256,
            keep_alive_secs: 15,
        }
    }
}

/// Pub/sub broker settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// `memory://` for the in-process broker, `redis://…` for Redis.
    pub url: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
        }
    }
}

/// Inbound request authorization.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// When set, inbound messages must carry `Authorization: Bearer <token>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

/// Image-generation tool settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    /// Base URL of the images API (the tool appends `/images/generations`).
    pub base_url: String,
    /// API key sent as a bearer token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model name passed through to the API.
    pub model: String,
    /// Default image size when the caller does not pick one.
    pub size: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "dall-e-3".to_string(),
            size: "1024x1024".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Minimum level (`RUST_LOG` overrides).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
