//! Prometheus recorder and metric names recorded by the server.
//!
//! Transports and the method registry record their own series
//! (`relay_messages_*`, `relay_decode_errors_total`, `relay_rpc_*`); they all
//! land in the same recorder.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle that renders `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle backed by a recorder that is not installed globally.
///
/// Renders nothing that the process records; used where `/metrics` must
/// exist but no global recorder is wanted (tests, embedded servers).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Open event streams (gauge).
pub const STREAMS_ACTIVE: &str = "relay_streams_active";
/// Event streams opened (counter).
pub const STREAMS_TOTAL: &str = "relay_streams_total";
/// Event streams that failed to start or lost their broker (counter).
pub const STREAM_ERRORS_TOTAL: &str = "relay_stream_errors_total";
/// Inbound messages rejected at the HTTP boundary (counter, labels: status).
pub const INBOUND_REJECTED_TOTAL: &str = "relay_inbound_rejected_total";
