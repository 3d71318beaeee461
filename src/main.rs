use std::sync::Arc;

use routeplane::{
    api::start_api_server,
    observability::{init_observability, log_config_info},
    xds::{start_xds_server, XdsState},
    Config, Result, APP_NAME, VERSION,
};
use tokio::signal;
use tokio::try_join;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any configuration is read from the environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let config = Config::from_env()?;
    init_observability(&config.observability)?;

    info!(app_name = APP_NAME, version = VERSION, "Starting Envoy control plane");
    log_config_info(&config);

    let xds_addr = config.xds.socket_addr()?;
    let api_addr = config.api.socket_addr()?;

    let state = Arc::new(XdsState::new(config.graph.clone()));
    let initial = state.bootstrap().await?;
    info!(version = %initial.version(), "Published bootstrap snapshot");

    let xds_task = start_xds_server(state.clone(), xds_addr, shutdown_signal());
    let api_task = start_api_server(api_addr, state, shutdown_signal());

    match try_join!(xds_task, api_task) {
        Ok(_) => {
            info!("Control plane shutdown completed");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Control plane server error");
            Err(e)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Received shutdown signal");
}
