//! # Observability Infrastructure
//!
//! Structured logging and Prometheus metrics for the control plane.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::{init_metrics, MetricsRecorder};

use ::tracing::info;

use crate::config::ObservabilityConfig;
use crate::errors::Result;

/// Initialize all observability components
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    let installed = init_logging(config);

    init_metrics(config)?;

    info!(
        log_level = %config.log_level,
        json_logging = %config.json_logging,
        metrics_enabled = %config.enable_metrics,
        subscriber_installed = installed,
        "Observability initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_observability() {
        let config = ObservabilityConfig { enable_metrics: false, ..Default::default() };
        assert!(init_observability(&config).is_ok());
    }
}
