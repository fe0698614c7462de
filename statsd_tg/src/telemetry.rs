//! Self-telemetry.
//!
//! When configured, a Prometheus exporter serves the counters recorded by
//! workers and the coordinator. Without it every `metrics` call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tracing::info;

/// Errors produced by [`install_prometheus`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The exporter could not be built or installed
    #[error("Failed to install prometheus recorder: {0}")]
    Prometheus(#[from] BuildError),
}

/// Install a Prometheus exporter listening on `addr` as the global recorder.
///
/// Outside of a tokio runtime the exporter runs on a background thread of its
/// own.
///
/// # Errors
///
/// Function will return an error if the listener cannot be bound or a
/// recorder is already installed.
pub fn install_prometheus(addr: SocketAddr) -> Result<(), Error> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("component_name", "statsd-tg")
        .install()?;
    info!("Prometheus exporter listening on {addr}");
    Ok(())
}
