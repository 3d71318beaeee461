//! # Structured Logging
//!
//! Subscriber setup plus span macros for the control plane. `RUST_LOG` wins
//! over the configured level when set.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{Config, ObservabilityConfig};

/// Create a tracing span for xDS operations
#[macro_export]
macro_rules! xds_span {
    ($operation:expr, $node_id:expr) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $node_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for admin API requests
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4()
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber. Returns `false` when one is already set,
/// which happens in tests that share a process.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let result = if config.json_logging {
        tracing::subscriber::set_global_default(
            FmtSubscriber::builder().with_env_filter(filter).json().finish(),
        )
    } else {
        tracing::subscriber::set_global_default(
            FmtSubscriber::builder().with_env_filter(filter).with_target(true).finish(),
        )
    };

    result.is_ok()
}

/// Log configuration at startup
pub fn log_config_info(config: &Config) {
    tracing::info!(
        xds_address = %format!("{}:{}", config.xds.bind_address, config.xds.port),
        api_address = %format!("{}:{}", config.api.bind_address, config.api.port),
        node_id = %config.graph.node_id,
        listener = %config.graph.listener_name,
        route_table = %config.graph.route_table_name,
        metrics_enabled = %config.observability.enable_metrics,
        "routeplane control plane configuration"
    );
}
