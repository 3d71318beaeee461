//! Declarative route input and its compilation into graph values.
//!
//! The JSON accepted by the admin API is deliberately loose: optional
//! fields may be absent or `null`, header objects accept `name`/`key` and
//! `value` in either case, and unknown enum strings fall back to defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

use crate::config::GraphConfig;
use crate::xds::cluster::build_cluster;
use crate::xds::model::{
    BuildWarning, ClusterSpec, HeaderInjection, HeaderMatcher, RouteDraft, RouteTableSpec,
    VirtualHostDraft, WeightedMember, DEFAULT_UPSTREAM_PORT,
};
use crate::xds::route::{build_route, build_route_table, build_weighted_route};

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn validate_prefix(prefix: &str) -> Result<(), ValidationError> {
    if prefix.starts_with('/') {
        Ok(())
    } else {
        let mut err = ValidationError::new("prefix");
        err.message = Some("Route prefix must start with '/'".into());
        Err(err)
    }
}

/// Body of `POST /api/v1/routes`
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct RoutesRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    #[validate(nested)]
    pub routes: Vec<RouteDeclaration>,
}

/// A name/value header pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct HeaderDeclaration {
    #[serde(alias = "key", alias = "Key", alias = "Name")]
    #[validate(length(min = 1, message = "Header name cannot be empty"))]
    pub name: String,

    #[serde(default, alias = "Value", deserialize_with = "null_as_default")]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct WeightedClusterDeclaration {
    #[validate(length(min = 1, message = "Weighted cluster name cannot be empty"))]
    pub name: String,

    #[serde(default)]
    pub weight: u32,

    #[serde(default, deserialize_with = "null_as_default")]
    #[validate(nested)]
    pub request_headers_to_add: Vec<HeaderDeclaration>,
}

/// One declared route, optionally declaring the cluster it forwards to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
pub struct RouteDeclaration {
    #[validate(custom(function = "validate_prefix"))]
    pub prefix: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub cluster: String,

    /// Exact-match request headers
    #[serde(default, deserialize_with = "null_as_default")]
    #[validate(nested)]
    pub headers: Vec<HeaderDeclaration>,

    /// Headers injected upstream and mirrored as cookies
    #[serde(default, deserialize_with = "null_as_default")]
    #[validate(nested)]
    pub headers_to_add: Vec<HeaderDeclaration>,

    #[serde(default)]
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: Option<u32>,

    #[serde(default, deserialize_with = "null_as_default")]
    #[validate(nested)]
    pub weighted_clusters: Vec<WeightedClusterDeclaration>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub prefix_rewrite: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub cluster_type: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub tls: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub dns_lookup_family: String,
}

impl RouteDeclaration {
    fn upstream_port(&self) -> u16 {
        self.port.and_then(|p| u16::try_from(p).ok()).unwrap_or(DEFAULT_UPSTREAM_PORT)
    }

    fn declared_cluster(&self) -> Option<ClusterSpec> {
        if self.cluster.is_empty() {
            return None;
        }
        let host = if self.address.is_empty() { &self.cluster } else { &self.address };
        Some(build_cluster(
            &self.cluster,
            host,
            self.upstream_port(),
            &self.cluster_type,
            &self.dns_lookup_family,
            self.tls,
        ))
    }

    fn matchers(&self) -> Vec<HeaderMatcher> {
        self.headers.iter().map(|h| HeaderMatcher::new(&h.name, &h.value)).collect()
    }
}

fn injections(headers: &[HeaderDeclaration]) -> Vec<HeaderInjection> {
    headers.iter().map(|h| HeaderInjection::new(&h.name, &h.value)).collect()
}

/// Graph values produced from one admin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRoutes {
    pub clusters: Vec<ClusterSpec>,
    pub route_table: RouteTableSpec,
    pub warnings: Vec<BuildWarning>,
}

/// Compile declarations into clusters plus a single-virtual-host route
/// table named by `graph`. A weighted split takes precedence over
/// `cluster`; a declaration with neither is skipped with a warning.
pub fn compile(routes: &[RouteDeclaration], graph: &GraphConfig) -> CompiledRoutes {
    let mut warnings = Vec::new();
    let mut clusters: BTreeMap<String, ClusterSpec> = BTreeMap::new();
    let mut drafts = Vec::with_capacity(routes.len());

    for decl in routes {
        if let Some(cluster) = decl.declared_cluster() {
            if let Some(previous) = clusters.get(&cluster.name) {
                if *previous != cluster {
                    warnings.push(BuildWarning::DuplicateCluster { name: cluster.name.clone() });
                }
            }
            clusters.insert(cluster.name.clone(), cluster);
        }

        if !decl.weighted_clusters.is_empty() {
            let members = decl
                .weighted_clusters
                .iter()
                .map(|wc| WeightedMember {
                    cluster: wc.name.clone(),
                    weight: wc.weight,
                    injections: injections(&wc.request_headers_to_add),
                })
                .collect();
            let built = build_weighted_route(
                &decl.prefix,
                decl.matchers(),
                injections(&decl.headers_to_add),
                members,
                &decl.prefix_rewrite,
            );
            warnings.extend(built.warnings);
            if let Some(entry) = built.value {
                drafts.push(entry.into());
            }
        } else if !decl.cluster.is_empty() {
            let entry = build_route(
                &decl.prefix,
                &decl.cluster,
                decl.matchers(),
                injections(&decl.headers_to_add),
                &decl.prefix_rewrite,
                &decl.address,
            );
            drafts.push(entry.into());
        } else {
            drafts.push(RouteDraft::incomplete(decl.prefix.clone()));
        }
    }

    let table = build_route_table(
        &graph.route_table_name,
        vec![VirtualHostDraft {
            name: graph.virtual_host_name.clone(),
            domains: graph.domains.clone(),
            routes: drafts,
            cors: graph.cors.clone(),
        }],
    );
    warnings.extend(table.warnings);

    CompiledRoutes {
        clusters: clusters.into_values().collect(),
        route_table: table.value,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xds::model::{RouteAction, RouteEntryAction, UpstreamTls};

    fn parse(json: &str) -> RoutesRequest {
        serde_json::from_str(json).expect("valid request json")
    }

    #[test]
    fn tls_declaration_builds_tls_cluster_and_route() {
        let req = parse(
            r#"{"routes":[
                {"prefix":"/pay","cluster":"payments","address":"pay.example.com","tls":true}
            ]}"#,
        );
        let compiled = compile(&req.routes, &GraphConfig::default());

        assert_eq!(compiled.clusters.len(), 1);
        let cluster = &compiled.clusters[0];
        assert_eq!(cluster.port, 443);
        assert_eq!(cluster.tls, Some(UpstreamTls { sni: "pay.example.com".into() }));

        let routes = &compiled.route_table.virtual_hosts[0].routes;
        assert_eq!(routes.len(), 2);
        let RouteEntryAction::Route(RouteAction::Cluster(target)) = &routes[0].action else {
            panic!("expected cluster route");
        };
        assert_eq!(target.cluster, "payments");
        assert_eq!(target.prefix_rewrite, "/");
        assert_eq!(target.host_rewrite.as_deref(), Some("pay.example.com"));
        assert!(routes[1].is_catch_all());
    }

    #[test]
    fn weighted_split_and_plain_route() {
        let req = parse(
            r#"{"routes":[
                {"prefix":"/a","cluster":"a"},
                {"prefix":"/split","weighted_clusters":[
                    {"name":"b","weight":70},{"name":"c","weight":30}
                ]}
            ]}"#,
        );
        let compiled = compile(&req.routes, &GraphConfig::default());

        assert!(compiled.warnings.is_empty());
        let names: Vec<_> = compiled.clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);

        let routes = &compiled.route_table.virtual_hosts[0].routes;
        assert_eq!(routes.len(), 3);
        let RouteEntryAction::Route(RouteAction::Weighted { clusters, .. }) = &routes[1].action
        else {
            panic!("expected weighted route");
        };
        assert_eq!(clusters.total_weight(), 100);
        assert!(routes[2].is_catch_all());
    }

    #[test]
    fn weighted_split_keeps_route_level_headers_to_add() {
        let req = parse(
            r#"{"routes":[{"prefix":"/s",
                "headers_to_add":[{"name":"x-stack","value":"blue"}],
                "weighted_clusters":[{"name":"b","weight":70},{"name":"c","weight":30}]}]}"#,
        );
        let compiled = compile(&req.routes, &GraphConfig::default());

        assert!(compiled.warnings.is_empty());
        let entry = &compiled.route_table.virtual_hosts[0].routes[0];
        assert!(matches!(entry.action, RouteEntryAction::Route(RouteAction::Weighted { .. })));
        assert_eq!(entry.injections, vec![HeaderInjection::new("x-stack", "blue")]);
    }

    #[test]
    fn declaration_without_action_is_skipped_with_warning() {
        let req = parse(r#"{"routes":[{"prefix":"/nothing"},{"prefix":"/a","cluster":"a"}]}"#);
        let compiled = compile(&req.routes, &GraphConfig::default());

        assert_eq!(
            compiled.warnings,
            vec![BuildWarning::IncompleteRoute { prefix: "/nothing".into() }]
        );
        let routes = &compiled.route_table.virtual_hosts[0].routes;
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].prefix, "/a");
    }

    #[test]
    fn defaults_and_names_come_from_graph_config() {
        let req = parse(r#"{"routes":[{"prefix":"/a","cluster":"a"}]}"#);
        let compiled = compile(&req.routes, &GraphConfig::default());

        let cluster = &compiled.clusters[0];
        assert_eq!(cluster.host, "a");
        assert_eq!(cluster.port, 80);
        assert_eq!(compiled.route_table.name, "local_routes");
        let vh = &compiled.route_table.virtual_hosts[0];
        assert_eq!(vh.name, "backend");
        assert_eq!(vh.domains, vec!["*".to_string()]);
        assert!(vh.cors.is_some());
    }

    #[test]
    fn header_aliases_and_nulls_are_accepted() {
        let req = parse(
            r#"{"routes":[{"prefix":"/a","cluster":"a","headers":null,
                "headers_to_add":[{"Key":"x-stack","Value":"blue"}],
                "weighted_clusters":null,"address":null}]}"#,
        );
        let decl = &req.routes[0];
        assert!(decl.headers.is_empty());
        assert!(decl.weighted_clusters.is_empty());
        assert_eq!(decl.address, "");
        assert_eq!(
            decl.headers_to_add[0],
            HeaderDeclaration { name: "x-stack".into(), value: "blue".into() }
        );
    }

    #[test]
    fn conflicting_cluster_declarations_warn() {
        let req = parse(
            r#"{"routes":[
                {"prefix":"/a","cluster":"a","port":8080},
                {"prefix":"/b","cluster":"a","port":9090}
            ]}"#,
        );
        let compiled = compile(&req.routes, &GraphConfig::default());
        assert_eq!(compiled.warnings, vec![BuildWarning::DuplicateCluster { name: "a".into() }]);
        assert_eq!(compiled.clusters[0].port, 9090);
    }

    #[test]
    fn validation_rejects_bad_prefix_and_port() {
        let bad_prefix = parse(r#"{"routes":[{"prefix":"api","cluster":"a"}]}"#);
        assert!(bad_prefix.validate().is_err());

        let bad_port = parse(r#"{"routes":[{"prefix":"/a","cluster":"a","port":70000}]}"#);
        assert!(bad_port.validate().is_err());

        let ok = parse(r#"{"routes":[{"prefix":"/a","cluster":"a","port":8080}]}"#);
        assert!(ok.validate().is_ok());
    }
}
