//! Route handlers.
//!
//! - [`stream`]: `GET <sse_path>` opens an event stream
//! - [`message`]: `POST <message_path>` publishes one inbound message
//! - `GET /health` and `GET /metrics`

pub mod message;
pub mod stream;

use axum::Json;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use relay_broker::Broker;

use crate::health::{self, HealthResponse};
use crate::server::AppState;

pub use message::post_message;
pub use stream::open_stream;

/// `GET /health`
pub async fn health_handler<B: Broker>(State(state): State<AppState<B>>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.streams.count()))
}

/// `GET /metrics`
pub async fn metrics_handler<B: Broker>(State(state): State<AppState<B>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
