//! State-of-the-world ADS stream loop.
//!
//! One task per stream. It tracks the node id, the last version and nonce
//! sent per type URL, and the resource names each type is subscribed to.
//! Requests are answered from the node's current snapshot; snapshot swaps
//! for the node are pushed to every subscribed type.
//!
//! - ACK: nonce and version match the last response, no `error_detail`,
//!   and the snapshot has not moved on. Nothing is sent.
//! - NACK: `error_detail` present. Logged; the current snapshot is sent
//!   only when it differs from the rejected version.
//! - A request echoing an older nonce is stale and ignored.

use std::collections::HashMap;
use std::sync::Arc;

use envoy_types::pb::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use futures::Stream;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tonic::Status;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::observability::MetricsRecorder;
use crate::xds::resources::{BuiltResource, ResourceKind};
use crate::xds::snapshot::{Snapshot, SnapshotUpdate};
use crate::xds::state::XdsState;

/// Tracks the last sent version and nonce for ACK/NACK detection
#[derive(Clone, Debug, PartialEq, Eq)]
struct LastDiscoverySnapshot {
    version: String,
    nonce: String,
}

/// Build a response for `kind` from `snapshot`, restricted to `names` when
/// that list is non-empty.
pub fn build_response(
    snapshot: &Snapshot,
    kind: ResourceKind,
    names: &[String],
) -> DiscoveryResponse {
    let resources = snapshot
        .resources(kind)
        .iter()
        .filter(|r| names.is_empty() || names.iter().any(|n| *n == r.name))
        .cloned()
        .map(BuiltResource::into_any)
        .collect();

    DiscoveryResponse {
        version_info: snapshot.version().to_string(),
        resources,
        type_url: kind.type_url().to_string(),
        nonce: Uuid::new_v4().to_string(),
        ..Default::default()
    }
}

/// Per-stream protocol state.
#[derive(Debug, Default)]
struct StreamState {
    node_id: Option<String>,
    last_sent: HashMap<String, LastDiscoverySnapshot>,
    subscriptions: HashMap<String, Vec<String>>,
}

impl StreamState {
    fn node_id<'a>(&'a self, state: &'a XdsState) -> &'a str {
        self.node_id.as_deref().unwrap_or_else(|| state.node_id())
    }

    fn on_request(
        &mut self,
        state: &XdsState,
        request: DiscoveryRequest,
        metrics: &MetricsRecorder,
    ) -> Option<DiscoveryResponse> {
        if self.node_id.is_none() {
            if let Some(node) = request.node.as_ref().filter(|n| !n.id.is_empty()) {
                self.node_id = Some(node.id.clone());
            }
        }
        let node_id = self.node_id(state).to_string();

        let span = crate::xds_span!("discovery_request", node_id, type_url = %request.type_url);
        let _enter = span.enter();

        let Some(kind) = ResourceKind::from_type_url(&request.type_url) else {
            debug!(type_url = %request.type_url, "Ignoring request for unserved resource type");
            return None;
        };

        let snapshot = state.cache().snapshot(&node_id);
        let last = self.last_sent.get(&request.type_url);

        if let Some(last) = last {
            if !request.response_nonce.is_empty() && request.response_nonce != last.nonce {
                debug!(nonce = %request.response_nonce, "Ignoring request with stale nonce");
                return None;
            }
        }

        let is_ack = last
            .map(|last| {
                !request.response_nonce.is_empty()
                    && request.version_info == last.version
                    && request.error_detail.is_none()
                    && snapshot.as_ref().map(|s| s.version() == last.version).unwrap_or(true)
            })
            .unwrap_or(false);

        metrics.record_xds_request(&request.type_url, is_ack);
        self.subscriptions.insert(request.type_url.clone(), request.resource_names.clone());

        if is_ack {
            debug!(
                version = %request.version_info,
                nonce = %request.response_nonce,
                "[ACK] Skipping duplicate discovery request"
            );
            return None;
        }

        if let Some(error_detail) = request.error_detail.as_ref() {
            warn!(
                nonce = %request.response_nonce,
                error_code = error_detail.code,
                error_message = %error_detail.message,
                "[NACK] Envoy rejected previous response"
            );
            metrics.record_xds_nack(&request.type_url);
            let rejected = last.map(|l| l.version.as_str());
            if snapshot.as_ref().map(|s| s.version()) == rejected {
                return None;
            }
        }

        let Some(snapshot) = snapshot else {
            debug!("No snapshot yet; waiting for first publish");
            return None;
        };

        let response = build_response(&snapshot, kind, &request.resource_names);
        self.record_sent(&response);
        Some(response)
    }

    fn on_update(&mut self, state: &XdsState, update: &SnapshotUpdate) -> Vec<DiscoveryResponse> {
        if update.node_id != self.node_id(state) {
            return Vec::new();
        }

        let mut responses = Vec::new();
        for (type_url, names) in &self.subscriptions {
            let Some(kind) = ResourceKind::from_type_url(type_url) else { continue };
            let already_sent = self
                .last_sent
                .get(type_url)
                .map(|last| last.version == update.snapshot.version())
                .unwrap_or(false);
            if !already_sent {
                responses.push(build_response(&update.snapshot, kind, names));
            }
        }

        for response in &responses {
            self.record_sent(response);
        }
        responses
    }

    fn record_sent(&mut self, response: &DiscoveryResponse) {
        self.last_sent.insert(
            response.type_url.clone(),
            LastDiscoverySnapshot {
                version: response.version_info.clone(),
                nonce: response.nonce.clone(),
            },
        );
    }
}

/// Run the SotW ADS loop for one client stream.
pub fn run_stream_loop<S>(
    state: Arc<XdsState>,
    mut in_stream: S,
    label: &str,
) -> ReceiverStream<Result<DiscoveryResponse, Status>>
where
    S: Stream<Item = Result<DiscoveryRequest, Status>> + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(100);
    let label: Arc<str> = Arc::from(label);
    let mut update_rx = state.cache().subscribe();
    let metrics = MetricsRecorder::new();

    tokio::spawn(async move {
        let mut stream_state = StreamState::default();
        metrics.record_xds_connection(true);

        loop {
            tokio::select! {
                result = in_stream.next() => {
                    match result {
                        Some(Ok(request)) => {
                            info!(
                                type_url = %request.type_url,
                                version_info = %request.version_info,
                                node_id = ?request.node.as_ref().map(|n| &n.id),
                                stream = %label,
                                "Received discovery request"
                            );
                            let response = stream_state.on_request(&state, request, &metrics);
                            if let Some(response) = response {
                                info!(
                                    type_url = %response.type_url,
                                    version = %response.version_info,
                                    resource_count = response.resources.len(),
                                    stream = %label,
                                    "Sending discovery response"
                                );
                                if tx.send(Ok(response)).await.is_err() {
                                    debug!(stream = %label, "Discovery response receiver dropped");
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!(stream = %label, error = %e, "Error receiving discovery request");
                            let _ = tx.send(Err(e)).await;
                            break;
                        }
                        None => {
                            info!(stream = %label, "ADS stream ended by client");
                            break;
                        }
                    }
                }
                update = update_rx.recv() => {
                    match update {
                        Ok(update) => {
                            let responses = stream_state.on_update(&state, &update);
                            let mut closed = false;
                            for response in responses {
                                info!(
                                    type_url = %response.type_url,
                                    version = %response.version_info,
                                    resource_count = response.resources.len(),
                                    stream = %label,
                                    "Pushing SOTW update response"
                                );
                                if tx.send(Ok(response)).await.is_err() {
                                    closed = true;
                                    break;
                                }
                            }
                            if closed {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(stream = %label, skipped, "Missed snapshot notifications");
                            let current = state.cache().snapshot(stream_state.node_id(&state));
                            if let Some(snapshot) = current {
                                let update = SnapshotUpdate {
                                    node_id: stream_state.node_id(&state).to_string(),
                                    snapshot,
                                };
                                for response in stream_state.on_update(&state, &update) {
                                    if tx.send(Ok(response)).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Err(RecvError::Closed) => {
                            warn!(stream = %label, "Snapshot notification channel closed");
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!(stream = %label, "Shutting down ADS stream");
                    break;
                }
            }
        }

        metrics.record_xds_connection(false);
    });

    ReceiverStream::new(rx)
}
