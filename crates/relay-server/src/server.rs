//! `RelayServer`: axum router and listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use relay_broker::Broker;
use relay_rpc::{MethodRegistry, RpcContext};
use relay_settings::RelaySettings;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::handlers;
use crate::shutdown::ShutdownCoordinator;
use crate::streams::StreamRegistry;

/// Shared state accessible from axum handlers.
pub struct AppState<B: Broker> {
    /// Loaded settings.
    pub settings: Arc<RelaySettings>,
    /// Unconnected broker client; every transport works on a duplicate.
    pub broker: Arc<B>,
    /// Dispatcher for inbound messages.
    pub registry: Arc<MethodRegistry>,
    /// Dependencies handed to method handlers.
    pub rpc: RpcContext,
    /// Live event streams.
    pub streams: Arc<StreamRegistry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Renders `/metrics`.
    pub metrics: PrometheusHandle,
}

impl<B: Broker> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            broker: Arc::clone(&self.broker),
            registry: Arc::clone(&self.registry),
            rpc: self.rpc.clone(),
            streams: Arc::clone(&self.streams),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        }
    }
}

/// The relay HTTP server.
pub struct RelayServer<B: Broker> {
    state: AppState<B>,
}

impl<B: Broker> RelayServer<B> {
    /// Create a server over an unconnected `broker`.
    pub fn new(
        settings: RelaySettings,
        broker: B,
        registry: MethodRegistry,
        rpc: RpcContext,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            state: AppState {
                settings: Arc::new(settings),
                broker: Arc::new(broker),
                registry: Arc::new(registry),
                rpc,
                streams: Arc::new(StreamRegistry::new()),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics,
            },
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let server = &self.state.settings.server;
        Router::new()
            .route(&server.sse_path, get(handlers::open_stream::<B>))
            .route(
                &server.message_path,
                post(handlers::post_message::<B>)
                    .layer(DefaultBodyLimit::max(server.max_body_bytes)),
            )
            .route("/health", get(handlers::health_handler::<B>))
            .route("/metrics", get(handlers::metrics_handler::<B>))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serving
    /// task. Triggering [`Self::shutdown`] closes every live stream and lets
    /// the task finish once in-flight requests drain.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), std::io::Error> {
        let server = &self.state.settings.server;
        let listener = TcpListener::bind((server.host.as_str(), server.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, sse_path = %server.sse_path, message_path = %server.message_path, "relay listening");

        let router = self.router();
        let token = self.state.shutdown.token();
        let streams = Arc::clone(&self.state.streams);
        let handle = tokio::spawn(async move {
            let drain = async move {
                token.cancelled().await;
                let closing = streams.close_all();
                info!(closing, "shutting down, closing event streams");
            };
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(drain)
                .await
            {
                error!(error = %err, "server error");
            }
            info!("relay stopped");
        });

        Ok((addr, handle))
    }

    /// Live event streams.
    pub fn streams(&self) -> &Arc<StreamRegistry> {
        &self.state.streams
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Loaded settings.
    pub fn settings(&self) -> &RelaySettings {
        &self.state.settings
    }

    /// Method registry.
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.state.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use relay_broker::MemoryBroker;
    use relay_rpc::handlers::register_all;
    use serde_json::Value;
    use tower::ServiceExt;

    const PING: &str = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;

    fn make_server(settings: RelaySettings, broker: MemoryBroker) -> RelayServer<MemoryBroker> {
        let mut registry = MethodRegistry::new();
        register_all(&mut registry);
        RelayServer::new(
            settings,
            broker,
            registry,
            RpcContext::default(),
            crate::metrics::detached_handle(),
        )
    }

    fn default_server() -> RelayServer<MemoryBroker> {
        make_server(RelaySettings::default(), MemoryBroker::new())
    }

    fn post(uri: &str, content_type: Option<&str>, body: &'static str) -> Request<Body> {
        let mut req = Request::builder().method("POST").uri(uri);
        if let Some(ct) = content_type {
            req = req.header(header::CONTENT_TYPE, ct);
        }
        req.body(Body::from(body)).unwrap()
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn accessors() {
        let server = default_server();
        assert_eq!(server.settings().server.sse_path, "/sse");
        assert!(!server.shutdown().is_shutting_down());
        assert_eq!(server.streams().count(), 0);
        assert!(server.registry().has_method("ping"));
    }

    #[tokio::test]
    async fn health_reports_streams() {
        let server = default_server();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed: Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["active_streams"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_is_prometheus_text() {
        let server = default_server();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = default_server();
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stream_opens_with_endpoint_event() {
        let server = default_server();
        let req = Request::builder().uri("/sse").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(resp.headers()[header::CONNECTION], "keep-alive");
        assert_eq!(server.streams().count(), 1);

        let mut body = resp.into_body().into_data_stream();
        let first = futures::StreamExt::next(&mut body).await.unwrap().unwrap();
        let text = String::from_utf8(first.to_vec()).unwrap();
        assert!(text.starts_with("event: endpoint\ndata: /message?sessionId="));
        assert!(text.ends_with("\n\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_gets_keep_alive_comments() {
        let mut settings = RelaySettings::default();
        settings.server.keep_alive_secs = 1;
        let server = make_server(settings, MemoryBroker::new());
        let req = Request::builder().uri("/sse").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();

        let mut body = resp.into_body().into_data_stream();
        let _announce = futures::StreamExt::next(&mut body).await.unwrap().unwrap();
        for _ in 0..2 {
            let frame = futures::StreamExt::next(&mut body).await.unwrap().unwrap();
            assert_eq!(&frame[..], b": keep-alive\n\n");
        }
    }

    #[tokio::test]
    async fn stream_refused_when_broker_unreachable() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let server = make_server(RelaySettings::default(), broker);
        let req = Request::builder().uri("/sse").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(server.streams().count(), 0);
    }

    #[tokio::test]
    async fn stream_refused_while_shutting_down() {
        let server = default_server();
        server.shutdown().shutdown();
        let req = Request::builder().uri("/sse").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn post_accepted_for_unknown_session() {
        let broker = MemoryBroker::new();
        let server = make_server(RelaySettings::default(), broker.clone());
        let resp = server
            .router()
            .oneshot(post("/message?sessionId=nobody-listens", Some("application/json"), PING))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(body_text(resp).await, "Accepted");
        assert!(broker.stats().publishes >= 1);
    }

    #[tokio::test]
    async fn post_without_session_is_400() {
        let server = default_server();
        let resp = server
            .router()
            .oneshot(post("/message", Some("application/json"), PING))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_with_malformed_session_is_400() {
        let server = default_server();
        let resp = server
            .router()
            .oneshot(post("/message?sessionId=a%20b", Some("application/json"), PING))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_text_plain_is_415_and_unpublished() {
        let broker = MemoryBroker::new();
        let server = make_server(RelaySettings::default(), broker.clone());
        let resp = server
            .router()
            .oneshot(post("/message?sessionId=s1", Some("text/plain"), PING))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(broker.stats().publishes, 0);
    }

    #[tokio::test]
    async fn post_with_non_ascii_content_type_is_415() {
        let broker = MemoryBroker::new();
        let server = make_server(RelaySettings::default(), broker.clone());
        let req = Request::builder()
            .method("POST")
            .uri("/message?sessionId=s1")
            .header(
                header::CONTENT_TYPE,
                header::HeaderValue::from_bytes(b"application/json\xff").unwrap(),
            )
            .body(Body::from(PING))
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(broker.stats().publishes, 0);
    }

    #[tokio::test]
    async fn post_latin1_body_is_decoded_and_published() {
        let broker = MemoryBroker::new();
        let server = make_server(RelaySettings::default(), broker.clone());
        let req = Request::builder()
            .method("POST")
            .uri("/message?sessionId=s1")
            .header(header::CONTENT_TYPE, "application/json; charset=iso-8859-1")
            .body(Body::from(
                &b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/note\",\"params\":{\"t\":\"caf\xe9\"}}"[..],
            ))
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(broker.stats().publishes >= 1);
    }

    #[tokio::test]
    async fn post_invalid_json_is_400() {
        let broker = MemoryBroker::new();
        let server = make_server(RelaySettings::default(), broker.clone());
        let resp = server
            .router()
            .oneshot(post("/message?sessionId=s1", Some("application/json"), "{\"jsonrpc\":"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(broker.stats().publishes, 0);
    }

    #[tokio::test]
    async fn post_requires_bearer_when_configured() {
        let broker = MemoryBroker::new();
        let mut settings = RelaySettings::default();
        settings.auth.bearer_token = Some("s3cret".into());
        let server = make_server(settings, broker.clone());

        let resp = server
            .router()
            .oneshot(post("/message?sessionId=s1", Some("application/json"), PING))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(broker.stats().publishes, 0);

        let req = Request::builder()
            .method("POST")
            .uri("/message?sessionId=s1")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::from(PING))
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn post_broker_down_is_502() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let server = make_server(RelaySettings::default(), broker);
        let resp = server
            .router()
            .oneshot(post("/message?sessionId=s1", Some("application/json"), PING))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let mut settings = RelaySettings::default();
        settings.server.max_body_bytes = 8;
        let server = make_server(settings, MemoryBroker::new());
        let resp = server
            .router()
            .oneshot(post("/message?sessionId=s1", Some("application/json"), PING))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn custom_paths_are_routed() {
        let mut settings = RelaySettings::default();
        settings.server.sse_path = "/events".into();
        settings.server.message_path = "/rpc".into();
        let server = make_server(settings, MemoryBroker::new());

        let req = Request::builder().uri("/events").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let mut body = resp.into_body().into_data_stream();
        let first = futures::StreamExt::next(&mut body).await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&first).contains("data: /rpc?sessionId="));

        let resp = server
            .router()
            .oneshot(post("/rpc?sessionId=s1", Some("application/json"), PING))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }
}
