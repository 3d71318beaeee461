use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::{errors::Error, xds::XdsState};

use super::routes::build_router;

/// Serve the admin API on `addr` until `shutdown_signal` resolves
pub async fn start_api_server<F>(
    addr: SocketAddr,
    state: Arc<XdsState>,
    shutdown_signal: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind API server: {}", e)))?;

    info!(address = %addr, "Starting HTTP API server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| Error::transport(format!("API server error: {}", e)))?;

    info!("API server shutdown completed");
    Ok(())
}
