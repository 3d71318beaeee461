//! # Configuration Management
//!
//! Environment-driven configuration for the routeplane control plane. Every
//! setting has a default, so an empty environment yields a runnable server
//! publishing to the `envoy-node-id` node.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;

use validator::Validate;

use crate::xds::model::CorsPolicy;
use crate::{Error, Result};

const ENV_PREFIX: &str = "ROUTEPLANE_";

/// Application configuration
#[derive(Debug, Clone, Default, Validate)]
pub struct Config {
    #[validate(nested)]
    pub xds: XdsConfig,

    #[validate(nested)]
    pub api: ApiConfig,

    #[validate(nested)]
    pub graph: GraphConfig,

    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

/// XDS server configuration
#[derive(Debug, Clone, Validate)]
pub struct XdsConfig {
    #[validate(length(min = 1, message = "xDS bind address cannot be empty"))]
    pub bind_address: String,

    #[validate(range(min = 1, max = 65535, message = "xDS port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for XdsConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_string(), port: 18000 }
    }
}

impl XdsConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr(&self.bind_address, self.port, "xDS")
    }
}

/// Administrative REST API configuration
#[derive(Debug, Clone, Validate)]
pub struct ApiConfig {
    #[validate(length(min = 1, message = "API bind address cannot be empty"))]
    pub bind_address: String,

    #[validate(range(min = 1, max = 65535, message = "API port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_string(), port: 9000 }
    }
}

impl ApiConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr(&self.bind_address, self.port, "API")
    }
}

/// Names and defaults used when compiling route declarations into the
/// resource graph.
#[derive(Debug, Clone, Validate)]
pub struct GraphConfig {
    /// Node id the snapshot is published under
    #[validate(length(min = 1, message = "Node id cannot be empty"))]
    pub node_id: String,

    #[validate(length(min = 1, message = "Listener name cannot be empty"))]
    pub listener_name: String,

    #[validate(length(min = 1, message = "Listener address cannot be empty"))]
    pub listener_address: String,

    #[validate(range(min = 1, max = 65535, message = "Listener port must be between 1 and 65535"))]
    pub listener_port: u16,

    #[validate(length(min = 1, message = "Route table name cannot be empty"))]
    pub route_table_name: String,

    #[validate(length(min = 1, message = "Virtual host name cannot be empty"))]
    pub virtual_host_name: String,

    #[validate(length(min = 1, message = "At least one virtual host domain is required"))]
    pub domains: Vec<String>,

    /// CORS policy attached to the virtual host, if any
    pub cors: Option<CorsPolicy>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            node_id: "envoy-node-id".to_string(),
            listener_name: "local_listener".to_string(),
            listener_address: "0.0.0.0".to_string(),
            listener_port: 8080,
            route_table_name: "local_routes".to_string(),
            virtual_host_name: "backend".to_string(),
            domains: vec!["*".to_string()],
            cors: Some(CorsPolicy::default()),
        }
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Validate)]
pub struct ObservabilityConfig {
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    pub json_logging: bool,

    pub enable_metrics: bool,

    #[validate(range(min = 1, max = 65535, message = "Metrics port must be between 1 and 65535"))]
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            enable_metrics: false,
            metrics_port: 9090,
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            xds: XdsConfig {
                bind_address: env_string("XDS_BIND_ADDRESS", defaults.xds.bind_address),
                port: env_parse("XDS_PORT", defaults.xds.port)?,
            },
            api: ApiConfig {
                bind_address: env_string("API_BIND_ADDRESS", defaults.api.bind_address),
                port: env_parse("API_PORT", defaults.api.port)?,
            },
            graph: GraphConfig {
                node_id: env_string("NODE_ID", defaults.graph.node_id),
                listener_name: env_string("LISTENER_NAME", defaults.graph.listener_name),
                listener_address: env_string("LISTENER_ADDRESS", defaults.graph.listener_address),
                listener_port: env_parse("LISTENER_PORT", defaults.graph.listener_port)?,
                route_table_name: env_string("ROUTE_TABLE_NAME", defaults.graph.route_table_name),
                virtual_host_name: env_string(
                    "VIRTUAL_HOST_NAME",
                    defaults.graph.virtual_host_name,
                ),
                domains: defaults.graph.domains,
                cors: defaults.graph.cors,
            },
            observability: ObservabilityConfig {
                log_level: env_string("LOG_LEVEL", defaults.observability.log_level),
                json_logging: env_parse("LOG_JSON", defaults.observability.json_logging)?,
                enable_metrics: env_parse(
                    "ENABLE_METRICS",
                    defaults.observability.enable_metrics,
                )?,
                metrics_port: env_parse("METRICS_PORT", defaults.observability.metrics_port)?,
            },
        };

        config.validate_all()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate_all(&self) -> Result<()> {
        Validate::validate(self).map_err(|e| Error::config(e.to_string()))?;

        if self.xds.port == self.api.port {
            return Err(Error::config(format!(
                "xDS and API servers cannot share port {}",
                self.xds.port
            )));
        }

        Ok(())
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(format!("{}{}", ENV_PREFIX, key)).unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(format!("{}{}", ENV_PREFIX, key)) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("Invalid {}{}: {}", ENV_PREFIX, key, e))),
        Err(_) => Ok(default),
    }
}

fn parse_socket_addr(host: &str, port: u16, what: &str) -> Result<SocketAddr> {
    format!("{}:{}", host, port)
        .parse()
        .map_err(|e| Error::config(format!("Invalid {} address: {}", what, e)))
}
