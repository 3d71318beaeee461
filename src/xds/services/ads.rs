use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use envoy_types::pb::envoy::service::discovery::v3::{
    aggregated_discovery_service_server::{
        AggregatedDiscoveryService, AggregatedDiscoveryServiceServer,
    },
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use tokio_stream::Stream;
use tonic::{transport::Server, Request, Response, Status};
use tracing::info;

use crate::xds::services::stream::run_stream_loop;
use crate::xds::state::XdsState;
use crate::{Error, Result};

/// ADS service backed by the snapshot cache
#[derive(Debug, Clone)]
pub struct SnapshotAggregatedDiscoveryService {
    state: Arc<XdsState>,
}

impl SnapshotAggregatedDiscoveryService {
    pub fn new(state: Arc<XdsState>) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for SnapshotAggregatedDiscoveryService {
    type StreamAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DiscoveryResponse, Status>> + Send>>;
    type DeltaAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DeltaDiscoveryResponse, Status>> + Send>>;

    async fn stream_aggregated_resources(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        info!(remote = ?request.remote_addr(), "New ADS stream connection established");

        let stream = run_stream_loop(self.state.clone(), request.into_inner(), "ADS");
        Ok(Response::new(Box::pin(stream)))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Err(Status::unimplemented("delta xDS is not supported; use state-of-the-world ADS"))
    }
}

/// Serve ADS on `addr` until `shutdown_signal` resolves
pub async fn start_xds_server<F>(
    state: Arc<XdsState>,
    addr: SocketAddr,
    shutdown_signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let ads_service = SnapshotAggregatedDiscoveryService::new(state);

    info!(address = %addr, "Starting xDS server");

    Server::builder()
        .add_service(AggregatedDiscoveryServiceServer::new(ads_service))
        .serve_with_shutdown(addr, shutdown_signal)
        .await
        .map_err(|e| {
            let error_msg = e.to_string();
            if error_msg.contains("Address already in use") || error_msg.contains("bind") {
                Error::transport(format!(
                    "XDS server failed to bind to {}: port {} is already in use",
                    addr,
                    addr.port()
                ))
            } else {
                Error::transport(format!("XDS server failed: {}", e))
            }
        })
}
