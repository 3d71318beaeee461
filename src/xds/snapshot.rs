//! Versioned snapshots and the per-node snapshot cache.
//!
//! A [`Snapshot`] is built once from the store, validated, encoded, and then
//! never mutated. Publishing swaps a new `Arc<Snapshot>` into the
//! [`SnapshotCache`]; readers holding the previous `Arc` keep a consistent view.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::observability::MetricsRecorder;
use crate::xds::model::{ListenerRoute, RouteAction, RouteEntryAction, RouteTableSpec};
use crate::xds::resources::{BuiltResource, ResourceKind};
use crate::xds::store::ConfigStore;
use crate::{Error, Result};

const UPDATE_CHANNEL_CAPACITY: usize = 128;

/// Immutable bundle of encoded resources at one version.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    sequence: u64,
    version: String,
    clusters: Vec<BuiltResource>,
    routes: Vec<BuiltResource>,
    listeners: Vec<BuiltResource>,
    created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Validate the store and encode it at version `v{sequence}`. Resources
    /// come out ordered by name.
    pub fn from_store(sequence: u64, store: &ConfigStore) -> Result<Self> {
        validate_store(store)?;

        Ok(Self {
            sequence,
            version: format!("v{}", sequence),
            clusters: store.clusters().map(|c| c.to_built_resource()).collect(),
            routes: store.route_tables().map(|t| t.to_built_resource()).collect(),
            listeners: store.listeners().map(|l| l.to_built_resource()).collect(),
            created_at: Utc::now(),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn resources(&self, kind: ResourceKind) -> &[BuiltResource] {
        match kind {
            ResourceKind::Cluster => &self.clusters,
            ResourceKind::Route => &self.routes,
            ResourceKind::Listener => &self.listeners,
        }
    }

    pub fn resource_names(&self, kind: ResourceKind) -> Vec<String> {
        self.resources(kind).iter().map(|r| r.name.clone()).collect()
    }

    /// True when both snapshots carry byte-identical resources.
    pub fn same_resources(&self, other: &Snapshot) -> bool {
        self.clusters == other.clusters
            && self.routes == other.routes
            && self.listeners == other.listeners
    }
}

fn validate_store(store: &ConfigStore) -> Result<()> {
    for cluster in store.clusters() {
        if cluster.name.is_empty() {
            return Err(Error::snapshot("cluster with empty name"));
        }
        if cluster.host.is_empty() {
            return Err(Error::snapshot(format!("cluster '{}' has no host", cluster.name)));
        }
        if cluster.port == 0 {
            return Err(Error::snapshot(format!("cluster '{}' has port 0", cluster.name)));
        }
    }

    for table in store.route_tables() {
        validate_route_table(table)?;
    }

    for listener in store.listeners() {
        if listener.name.is_empty() {
            return Err(Error::snapshot("listener with empty name"));
        }
        if listener.port == 0 {
            return Err(Error::snapshot(format!("listener '{}' has port 0", listener.name)));
        }
        match &listener.route {
            ListenerRoute::Rds(route_name) => {
                if store.route_table(route_name).is_none() {
                    return Err(Error::snapshot(format!(
                        "listener '{}' references missing route table '{}'",
                        listener.name, route_name
                    )));
                }
            }
            ListenerRoute::Inline(table) => validate_route_table(table)?,
        }
    }

    Ok(())
}

fn validate_route_table(table: &RouteTableSpec) -> Result<()> {
    if table.name.is_empty() {
        return Err(Error::snapshot("route table with empty name"));
    }

    for vh in &table.virtual_hosts {
        if vh.domains.is_empty() {
            return Err(Error::snapshot(format!(
                "virtual host '{}' in route table '{}' has no domains",
                vh.name, table.name
            )));
        }
        for route in &vh.routes {
            match &route.action {
                RouteEntryAction::DirectResponse(response)
                    if !(200..=599).contains(&response.status) =>
                {
                    return Err(Error::snapshot(format!(
                        "route '{}' in '{}' has invalid status {}",
                        route.prefix, table.name, response.status
                    )));
                }
                RouteEntryAction::Route(RouteAction::Weighted { clusters, .. })
                    if clusters.total_weight() == 0 =>
                {
                    return Err(Error::snapshot(format!(
                        "route '{}' in '{}' has zero total weight",
                        route.prefix, table.name
                    )));
                }
                _ => {}
            }
        }
    }

    Ok(())
}

/// A snapshot newly published for a node.
#[derive(Debug, Clone)]
pub struct SnapshotUpdate {
    pub node_id: String,
    pub snapshot: Arc<Snapshot>,
}

/// Current snapshot per node id, plus a broadcast of every swap.
#[derive(Debug)]
pub struct SnapshotCache {
    snapshots: DashMap<String, Arc<Snapshot>>,
    updates: broadcast::Sender<SnapshotUpdate>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self { snapshots: DashMap::new(), updates }
    }

    /// Swap in `snapshot` as the node's current view and notify subscribers.
    pub fn set_snapshot(&self, node_id: &str, snapshot: Arc<Snapshot>) {
        self.snapshots.insert(node_id.to_string(), snapshot.clone());
        // No subscribers is fine; streams read the cache when they connect.
        let _ = self.updates.send(SnapshotUpdate { node_id: node_id.to_string(), snapshot });
    }

    pub fn snapshot(&self, node_id: &str) -> Option<Arc<Snapshot>> {
        self.snapshots.get(node_id).map(|entry| entry.value().clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotUpdate> {
        self.updates.subscribe()
    }
}

/// Assigns versions and pushes snapshots into the cache. The version
/// counter advances only when a snapshot is accepted.
#[derive(Debug)]
pub struct SnapshotPublisher {
    node_id: String,
    last_version: u64,
    metrics: MetricsRecorder,
}

impl SnapshotPublisher {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self { node_id: node_id.into(), last_version: 0, metrics: MetricsRecorder::new() }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn last_version(&self) -> u64 {
        self.last_version
    }

    pub fn publish(&mut self, store: &ConfigStore, cache: &SnapshotCache) -> Result<Arc<Snapshot>> {
        let next = self
            .last_version
            .checked_add(1)
            .ok_or_else(|| Error::internal("snapshot version counter exhausted"))?;

        let snapshot = match Snapshot::from_store(next, store) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                warn!(node_id = %self.node_id, version = next, error = %e, "Snapshot rejected");
                self.metrics.record_snapshot_failure(&self.node_id);
                return Err(e);
            }
        };

        cache.set_snapshot(&self.node_id, snapshot.clone());
        self.last_version = next;

        info!(
            phase = "publish",
            node_id = %self.node_id,
            version = %snapshot.version(),
            clusters = snapshot.clusters.len(),
            routes = snapshot.routes.len(),
            listeners = snapshot.listeners.len(),
            "Published snapshot"
        );
        self.metrics.record_snapshot_published(&self.node_id, next);
        self.metrics.update_config_objects("clusters", snapshot.clusters.len());
        self.metrics.update_config_objects("routes", snapshot.routes.len());
        self.metrics.update_config_objects("listeners", snapshot.listeners.len());

        Ok(snapshot)
    }
}
