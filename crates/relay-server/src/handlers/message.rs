//! `POST <message_path>?sessionId=<id>`: publish one inbound message.

use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use relay_broker::{Broker, BrokerConnectionManager};
use relay_core::{ForwarderId, SessionId};
use relay_rpc::JsonRpcMessage;
use relay_transport::ForwarderTransport;
use serde::Deserialize;
use tracing::{Instrument, Span, debug, info_span, warn};

use crate::auth;
use crate::errors::ApiError;
use crate::server::AppState;

/// Query string of an inbound message.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// Session id announced by the stream's endpoint event.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Decode and publish the body on the session channel, then dispatch it.
///
/// One forwarder is created per request before authorization and decode.
/// An unknown but well-formed session id is accepted: delivery is
/// fire-and-forget. Any reply produced by dispatch is published through a
/// second forwarder and reaches the stream through the broker.
pub async fn post_message<B: Broker>(
    State(state): State<AppState<B>>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), ApiError> {
    let raw = query.session_id.ok_or(ApiError::MissingSession)?;
    let session_id = SessionId::parse(&raw)?;

    let span = info_span!(
        "forwarder",
        session_id = %session_id,
        forwarder_id = %ForwarderId::new()
    );
    let manager = BrokerConnectionManager::new(state.broker.duplicate());
    let mut forwarder = ForwarderTransport::new(manager, session_id.clone()).with_span(span.clone());

    if let Err(err) = auth::authorize(&headers, state.settings.auth.bearer_token.as_deref()) {
        warn!(parent: &span, error = %err, "rejecting unauthorized message");
        let _ = forwarder.close().await;
        return Err(err.into());
    }

    // Non-ASCII bytes become U+FFFD and fail the media type check.
    let content_type = headers
        .get(CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()));
    let message = forwarder.handle_post(content_type.as_deref(), &body).await?;
    debug!(parent: &span, kind = message.kind(), "message accepted");

    let _ = tokio::spawn(dispatch(state, session_id, message).instrument(span));
    Ok((StatusCode::ACCEPTED, "Accepted"))
}

async fn dispatch<B: Broker>(state: AppState<B>, session_id: SessionId, message: JsonRpcMessage) {
    let Some(reply) = state.registry.dispatch(message, &state.rpc).await else {
        return;
    };
    let manager = BrokerConnectionManager::new(state.broker.duplicate());
    let mut forwarder = ForwarderTransport::new(manager, session_id).with_span(Span::current());
    if let Err(err) = forwarder.send(&reply).await {
        warn!(error = %err, "failed to route reply to stream");
    }
}
