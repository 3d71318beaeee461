//! # Routeplane
//!
//! A minimal Envoy control plane. Route declarations posted to the admin API
//! are compiled into clusters, a route table and a listener, then published
//! to Envoy as one atomic, versioned snapshot over the Aggregated Discovery
//! Service.
//!
//! ```text
//! REST API → Graph Builder → Config Store → Snapshot Publisher → ADS → Envoy
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use routeplane::{xds::XdsState, Config, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     let state = Arc::new(XdsState::new(config.graph));
//!     let snapshot = state.bootstrap().await?;
//!     println!("serving {}", snapshot.version());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod errors;
pub mod observability;
pub mod xds;

pub use config::Config;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
