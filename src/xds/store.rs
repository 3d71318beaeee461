//! Latest declared clusters, route tables and listeners, keyed by name.
//!
//! Every write replaces a whole value. Ordered maps keep iteration stable,
//! so the same store contents always encode to the same snapshot bytes.

use std::collections::BTreeMap;

use crate::xds::model::{BuildWarning, ClusterSpec, ListenerSpec, RouteTableSpec};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigStore {
    clusters: BTreeMap<String, ClusterSpec>,
    route_tables: BTreeMap<String, RouteTableSpec>,
    listeners: BTreeMap<String, ListenerSpec>,
}

impl ConfigStore {
    /// Insert or replace each given cluster. Clusters not named are kept.
    pub fn replace_clusters(&mut self, clusters: impl IntoIterator<Item = ClusterSpec>) {
        for cluster in clusters {
            self.clusters.insert(cluster.name.clone(), cluster);
        }
    }

    pub fn replace_route_table(&mut self, table: RouteTableSpec) {
        self.route_tables.insert(table.name.clone(), table);
    }

    pub fn replace_listener(&mut self, listener: ListenerSpec) {
        self.listeners.insert(listener.name.clone(), listener);
    }

    pub fn cluster(&self, name: &str) -> Option<&ClusterSpec> {
        self.clusters.get(name)
    }

    pub fn route_table(&self, name: &str) -> Option<&RouteTableSpec> {
        self.route_tables.get(name)
    }

    pub fn listener(&self, name: &str) -> Option<&ListenerSpec> {
        self.listeners.get(name)
    }

    pub fn clusters(&self) -> impl Iterator<Item = &ClusterSpec> {
        self.clusters.values()
    }

    pub fn route_tables(&self) -> impl Iterator<Item = &RouteTableSpec> {
        self.route_tables.values()
    }

    pub fn listeners(&self) -> impl Iterator<Item = &ListenerSpec> {
        self.listeners.values()
    }

    pub fn cluster_names(&self) -> Vec<String> {
        self.clusters.keys().cloned().collect()
    }

    pub fn route_table_names(&self) -> Vec<String> {
        self.route_tables.keys().cloned().collect()
    }

    pub fn listener_names(&self) -> Vec<String> {
        self.listeners.keys().cloned().collect()
    }

    /// Cluster names referenced by `table` that this store does not hold.
    /// Reported as warnings; the proxy treats such routes as unavailable.
    pub fn unresolved_clusters(&self, table: &RouteTableSpec) -> Vec<BuildWarning> {
        table
            .referenced_clusters()
            .into_iter()
            .filter(|name| !self.clusters.contains_key(*name))
            .map(|name| BuildWarning::UnresolvedCluster {
                route_table: table.name.clone(),
                cluster: name.to_string(),
            })
            .collect()
    }
}
