//! # Metrics Collection
//!
//! Prometheus metrics for the control plane. The `metrics` macros are no-ops
//! until [`init_metrics`] installs an exporter, so recording is always safe.

use std::net::SocketAddr;

use ::tracing::info;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ObservabilityConfig;
use crate::{Error, Result};

/// Metrics recorder that tracks application metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record a successful snapshot publish
    pub fn record_snapshot_published(&self, node_id: &str, version: u64) {
        let labels = [("node_id", node_id.to_string())];
        counter!("snapshots_published_total", &labels).increment(1);
        gauge!("snapshot_version", &labels).set(version as f64);
    }

    /// Record a snapshot rejected at publish time
    pub fn record_snapshot_failure(&self, node_id: &str) {
        let labels = [("node_id", node_id.to_string())];
        counter!("snapshot_publish_failures_total", &labels).increment(1);
    }

    /// Record warnings produced while building the resource graph
    pub fn record_build_warnings(&self, count: usize) {
        if count > 0 {
            counter!("route_build_warnings_total").increment(count as u64);
        }
    }

    /// Update the number of configuration objects of a type
    pub fn update_config_objects(&self, resource_type: &str, count: usize) {
        let labels = [("resource_type", resource_type.to_string())];
        gauge!("config_objects_total", &labels).set(count as f64);
    }

    /// Record xDS connection events
    pub fn record_xds_connection(&self, connected: bool) {
        if connected {
            gauge!("xds_connections").increment(1.0);
        } else {
            gauge!("xds_connections").decrement(1.0);
        }
    }

    /// Record an xDS discovery request
    pub fn record_xds_request(&self, type_url: &str, ack: bool) {
        let kind = if ack { "ack" } else { "request" };
        let labels = [("type_url", type_url.to_string()), ("kind", kind.to_string())];
        counter!("xds_requests_total", &labels).increment(1);
    }

    /// Record an xDS NACK from a node
    pub fn record_xds_nack(&self, type_url: &str) {
        let labels = [("type_url", type_url.to_string())];
        counter!("xds_nacks_total", &labels).increment(1);
    }

    fn describe(&self) {
        describe_counter!("snapshots_published_total", "Snapshots swapped into the cache");
        describe_gauge!("snapshot_version", "Sequence of the last published snapshot");
        describe_counter!(
            "snapshot_publish_failures_total",
            "Snapshots rejected by structural validation"
        );
        describe_counter!("route_build_warnings_total", "Route entries skipped while building");
        describe_gauge!("config_objects_total", "Objects held in the configuration store");
        describe_gauge!("xds_connections", "Open ADS streams");
        describe_counter!("xds_requests_total", "Discovery requests received");
        describe_counter!("xds_nacks_total", "Discovery requests rejecting a version");
    }
}

/// Install the Prometheus exporter when metrics are enabled
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let socket_addr: SocketAddr = format!("0.0.0.0:{}", config.metrics_port)
        .parse()
        .map_err(|e| Error::config(format!("Invalid metrics bind address: {}", e)))?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", "routeplane")
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().describe();

    info!(metrics_addr = %socket_addr, "Prometheus metrics exporter started");
    Ok(())
}
