//! `GET <sse_path>`: open an event stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use metrics::counter;
use relay_broker::{Broker, BrokerConnectionManager};
use relay_transport::sse::KEEP_ALIVE_TEXT;
use relay_transport::{ChannelSink, STREAM_HEADERS, SinkReceiver, StreamOwnerTransport};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::errors::ApiError;
use crate::metrics::STREAM_ERRORS_TOTAL;
use crate::server::AppState;

/// Start a stream-owner transport, hand its delivery loop to a task, and
/// answer with the stream it writes.
///
/// The endpoint event is already queued when the response is returned. A
/// broker failure while starting answers 503.
pub async fn open_stream<B: Broker>(State(state): State<AppState<B>>) -> Response {
    if state.shutdown.is_shutting_down() {
        return ApiError::ShuttingDown.into_response();
    }
    let server = &state.settings.server;

    let (sink, receiver) = ChannelSink::new(server.stream_buffer);
    let base = BrokerConnectionManager::new(state.broker.duplicate());
    let mut transport = StreamOwnerTransport::new(base, sink, server.message_path.clone());
    transport.on_error(|_| counter!(STREAM_ERRORS_TOTAL).increment(1));

    if let Err(err) = transport.start().await {
        return ApiError::StreamUnavailable(err).into_response();
    }

    let handle = transport.handle();
    let session_id = handle.session_id().clone();
    state.streams.add(handle.clone());
    // Shutdown may have swept the registry between the check above and add.
    if state.shutdown.is_shutting_down() {
        handle.close();
    }

    let streams = Arc::clone(&state.streams);
    let _ = tokio::spawn(async move {
        if let Err(err) = transport.run().await {
            debug!(session_id = %session_id, error = %err, "delivery loop ended with error");
        }
        let _ = streams.remove(&session_id);
        info!(session_id = %session_id, "event stream closed");
    });

    let keep_alive = Some(Duration::from_secs(server.keep_alive_secs)).filter(|p| !p.is_zero());
    stream_response(receiver, keep_alive).await
}

async fn stream_response(receiver: SinkReceiver, keep_alive: Option<Duration>) -> Response {
    let SinkReceiver { headers, events } = receiver;
    let headers: HeaderMap = headers
        .await
        .unwrap_or_else(|_| STREAM_HEADERS.to_vec())
        .into_iter()
        .map(|(name, value)| (HeaderName::from_static(name), HeaderValue::from_static(value)))
        .collect();

    let sse = Sse::new(ReceiverStream::new(events).map(Ok::<_, Infallible>));
    match keep_alive {
        Some(period) => {
            let keep_alive = KeepAlive::new().interval(period).text(KEEP_ALIVE_TEXT);
            (headers, sse.keep_alive(keep_alive)).into_response()
        }
        None => (headers, sse).into_response(),
    }
}
