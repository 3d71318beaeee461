use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::GraphConfig;
use crate::observability::MetricsRecorder;
use crate::xds::declaration::{compile, RouteDeclaration};
use crate::xds::listener::build_listener;
use crate::xds::model::BuildWarning;
use crate::xds::snapshot::{Snapshot, SnapshotCache, SnapshotPublisher};
use crate::xds::store::ConfigStore;
use crate::Result;

/// Result of applying one batch of declarations.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub version: String,
    pub warnings: Vec<BuildWarning>,
}

/// Names of the resources currently held, plus the last published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceListing {
    pub clusters: Vec<String>,
    pub routes: Vec<String>,
    pub listeners: Vec<String>,
    pub version: u64,
}

#[derive(Debug)]
struct ControlPlane {
    store: ConfigStore,
    publisher: SnapshotPublisher,
}

/// Shared control-plane state. Mutations run one at a time under `inner`;
/// the snapshot cache is read without that lock.
#[derive(Debug)]
pub struct XdsState {
    graph: GraphConfig,
    inner: Mutex<ControlPlane>,
    cache: SnapshotCache,
    metrics: MetricsRecorder,
}

impl XdsState {
    pub fn new(graph: GraphConfig) -> Self {
        let publisher = SnapshotPublisher::new(graph.node_id.clone());
        Self {
            graph,
            inner: Mutex::new(ControlPlane { store: ConfigStore::default(), publisher }),
            cache: SnapshotCache::new(),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn graph(&self) -> &GraphConfig {
        &self.graph
    }

    pub fn node_id(&self) -> &str {
        &self.graph.node_id
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.cache.snapshot(&self.graph.node_id)
    }

    /// Publish the configured listener before any routes exist, so proxies
    /// that connect early receive a listener serving the inline 404 table.
    pub async fn bootstrap(&self) -> Result<Arc<Snapshot>> {
        let mut guard = self.inner.lock().await;
        let ControlPlane { store, publisher } = &mut *guard;

        let listener = build_listener(
            &self.graph.listener_name,
            &self.graph.listener_address,
            self.graph.listener_port,
            &self.graph.route_table_name,
            store,
        );
        let previous = store.clone();
        store.replace_listener(listener);

        match publisher.publish(store, &self.cache) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                *store = previous;
                Err(e)
            }
        }
    }

    /// Compile `routes`, replace the affected store entries, rebuild the
    /// listener and publish. If the publish is rejected the store is put
    /// back exactly as it was and the version does not advance.
    pub async fn apply(&self, routes: &[RouteDeclaration]) -> Result<ApplyOutcome> {
        let compiled = compile(routes, &self.graph);
        let mut warnings = compiled.warnings;

        let mut guard = self.inner.lock().await;
        let ControlPlane { store, publisher } = &mut *guard;
        let previous = store.clone();

        store.replace_clusters(compiled.clusters);
        warnings.extend(store.unresolved_clusters(&compiled.route_table));
        store.replace_route_table(compiled.route_table);

        let listener = build_listener(
            &self.graph.listener_name,
            &self.graph.listener_address,
            self.graph.listener_port,
            &self.graph.route_table_name,
            store,
        );
        store.replace_listener(listener);

        for warning in &warnings {
            warn!(node_id = %self.graph.node_id, warning = %warning, "Route build warning");
        }
        self.metrics.record_build_warnings(warnings.len());

        match publisher.publish(store, &self.cache) {
            Ok(snapshot) => {
                info!(
                    version = %snapshot.version(),
                    declarations = routes.len(),
                    warnings = warnings.len(),
                    "Applied route declarations"
                );
                Ok(ApplyOutcome { version: snapshot.version().to_string(), warnings })
            }
            Err(e) => {
                *store = previous;
                warn!(error = %e, "Publish rejected; configuration store rolled back");
                Err(e)
            }
        }
    }

    /// Publish the current store again under a fresh version.
    pub async fn republish(&self) -> Result<Arc<Snapshot>> {
        let mut guard = self.inner.lock().await;
        let ControlPlane { store, publisher } = &mut *guard;
        publisher.publish(store, &self.cache)
    }

    pub async fn resources(&self) -> ResourceListing {
        let guard = self.inner.lock().await;
        ResourceListing {
            clusters: guard.store.cluster_names(),
            routes: guard.store.route_table_names(),
            listeners: guard.store.listener_names(),
            version: guard.publisher.last_version(),
        }
    }

    /// Copy of the current store, mainly for inspection in tests.
    pub async fn store(&self) -> ConfigStore {
        self.inner.lock().await.store.clone()
    }
}
