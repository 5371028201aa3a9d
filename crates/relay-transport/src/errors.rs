//! Transport error types.

use relay_broker::BrokerError;
use relay_rpc::MessageError;

/// Why an inbound body could not be turned into a message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// No `Content-Type` header was supplied.
    #[error("missing content type")]
    MissingContentType,

    /// The media type is not `application/json`.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The declared charset is not a known encoding label.
    #[error("unsupported charset: {0}")]
    UnsupportedCharset(String),

    /// The body is malformed in its charset (named by its canonical label).
    #[error("body is not valid {0}")]
    InvalidEncoding(&'static str),

    /// The body is not JSON or not a valid JSON-RPC message.
    #[error(transparent)]
    Message(#[from] MessageError),
}

impl DecodeError {
    /// Whether the failure concerns the media type rather than the body.
    pub fn is_unsupported_media(&self) -> bool {
        matches!(
            self,
            Self::MissingContentType | Self::UnsupportedContentType(_) | Self::UnsupportedCharset(_)
        )
    }
}

/// Failure writing to the outbound event stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The peer went away.
    #[error("event stream peer disconnected")]
    Disconnected,

    /// `open` was called twice.
    #[error("event stream already open")]
    AlreadyOpen,

    /// A frame was written before `open`.
    #[error("event stream not open")]
    NotOpen,
}

/// Error raised by either transport role.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Broker connect, subscribe, unsubscribe, publish, or disconnect failed,
    /// or the broker dropped the subscription.
    #[error("broker: {0}")]
    Connection(#[from] BrokerError),

    /// Inbound payload rejected.
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    /// Operation not allowed in the transport's current state.
    #[error("cannot {operation} while {state}")]
    Lifecycle {
        /// Attempted operation.
        operation: &'static str,
        /// State the transport was in.
        state: &'static str,
    },

    /// Writing to the outbound stream failed.
    #[error("stream: {0}")]
    Stream(#[from] SinkError),
}

impl TransportError {
    pub(crate) fn lifecycle(operation: &'static str, state: &'static str) -> Self {
        Self::Lifecycle { operation, state }
    }
}
