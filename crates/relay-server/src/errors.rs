//! Errors surfaced at the HTTP boundary and their status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use relay_core::IdError;
use relay_transport::TransportError;

use crate::auth::AuthError;
use crate::metrics::INBOUND_REJECTED_TOTAL;

/// Failure answering an HTTP request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// `sessionId` query parameter absent.
    #[error("missing sessionId query parameter")]
    MissingSession,
    /// `sessionId` present but not a usable identifier.
    #[error("invalid sessionId: {0}")]
    InvalidSession(#[from] IdError),
    /// Authorization failed.
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),
    /// The transport rejected or failed to deliver the message.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// An event stream could not be opened.
    #[error("event stream unavailable: {0}")]
    StreamUnavailable(TransportError),
    /// The server is shutting down.
    #[error("server is shutting down")]
    ShuttingDown,
}

impl ApiError {
    /// Status code returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingSession | Self::InvalidSession(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::StreamUnavailable(_) | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transport(TransportError::Decode(err)) if err.is_unsupported_media() => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            Self::Transport(TransportError::Decode(_)) => StatusCode::BAD_REQUEST,
            Self::Transport(TransportError::Connection(_)) => StatusCode::BAD_GATEWAY,
            Self::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        counter!(INBOUND_REJECTED_TOTAL, "status" => status.as_str().to_owned()).increment(1);
        (status, self.to_string()).into_response()
    }
}
