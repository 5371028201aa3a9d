//! # relay-agent
//!
//! Relay server binary: loads settings, picks the broker, registers the RPC
//! methods and tools, and serves until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_broker::{Broker, MemoryBroker};
use relay_core::logging::{LogFormat, init_subscriber};
use relay_rpc::tools::{ImageGenerationTool, ToolRegistry};
use relay_rpc::{MethodRegistry, RpcContext, ServerInfo};
use relay_server::RelayServer;
use relay_settings::RelaySettings;

/// Relay server: event streams routed to inbound messages over pub/sub.
#[derive(Parser, Debug)]
#[command(name = "relay-agent", about = "SSE relay server")]
struct Cli {
    /// JSON settings file, layered between defaults and `RELAY_*` variables.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    fn settings(&self) -> Result<RelaySettings> {
        let mut settings = relay_settings::load_settings_from(self.config.as_deref())
            .context("failed to load settings")?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        Ok(settings)
    }
}

/// Broker backend selected by the configured URL scheme.
#[derive(Debug, PartialEq, Eq)]
enum BrokerKind {
    Memory,
    Redis,
}

impl BrokerKind {
    fn from_url(url: &str) -> Result<Self> {
        if url.starts_with("memory://") {
            Ok(Self::Memory)
        } else if url.starts_with("redis://") || url.starts_with("rediss://") {
            Ok(Self::Redis)
        } else {
            bail!("unsupported broker url: {url}")
        }
    }
}

/// Method registry with every handler, plus the context carrying the tools.
fn build_rpc(settings: &RelaySettings) -> Result<(MethodRegistry, RpcContext)> {
    let mut tools = ToolRegistry::new();
    tools.register(
        ImageGenerationTool::new(settings.image.clone())
            .context("failed to build image generation tool")?,
    );
    if settings.image.api_key.is_none() {
        tracing::warn!("no image API key configured; generate_image calls will be unauthenticated");
    }

    let mut registry = MethodRegistry::new();
    relay_rpc::handlers::register_all(&mut registry);

    let rpc = RpcContext {
        tools: Arc::new(tools),
        server_info: ServerInfo::default(),
    };
    Ok((registry, rpc))
}

async fn serve<B: Broker>(
    settings: RelaySettings,
    broker: B,
    registry: MethodRegistry,
    rpc: RpcContext,
    metrics: PrometheusHandle,
) -> Result<()> {
    let method_count = registry.methods().len();
    let tool_count = rpc.tools.len();
    let server = RelayServer::new(settings, broker, registry, rpc, metrics);

    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    tracing::info!(
        "relay listening on http://{addr} ({method_count} RPC methods, {tool_count} tools)"
    );

    relay_server::shutdown::signal().await;

    tracing::info!("shutting down...");
    server.shutdown().drain(vec![handle], None).await;
    tracing::info!("shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);

    let metrics =
        relay_server::metrics::install_recorder().context("failed to install metrics recorder")?;
    let (registry, rpc) = build_rpc(&settings)?;

    match BrokerKind::from_url(&settings.broker.url)? {
        BrokerKind::Memory => {
            tracing::info!("using in-process broker");
            serve(settings, MemoryBroker::new(), registry, rpc, metrics).await
        }
        #[cfg(feature = "redis")]
        BrokerKind::Redis => {
            let broker = relay_broker::RedisBroker::new(&settings.broker.url)
                .context("invalid redis url")?;
            tracing::info!("using redis broker");
            serve(settings, broker, registry, rpc, metrics).await
        }
        #[cfg(not(feature = "redis"))]
        BrokerKind::Redis => {
            bail!("broker url {} requires the `redis` feature", settings.broker.url)
        }
    }
}
