//! Route building and conversion using envoy-types
//!
//! Builders here produce [`RouteEntry`] and [`RouteTableSpec`] values with
//! one canonical policy for both single-cluster and weighted routes: the
//! prefix rewrite defaults to `/`, and every header injection becomes one
//! upstream request header plus one `Set-Cookie` response header.

use envoy_types::pb::envoy::config::core::v3::{
    data_source::Specifier as DataSourceSpecifier, DataSource, HeaderValue, HeaderValueOption,
};
use envoy_types::pb::envoy::config::route::v3::{
    header_matcher::HeaderMatchSpecifier,
    route::Action,
    route_action::{ClusterSpecifier, HostRewriteSpecifier},
    route_match::PathSpecifier,
    weighted_cluster::ClusterWeight,
    DirectResponseAction, HeaderMatcher as EnvoyHeaderMatcher, Route,
    RouteAction as EnvoyRouteAction, RouteConfiguration, RouteMatch, VirtualHost, WeightedCluster,
};
use envoy_types::pb::envoy::extensions::filters::http::cors::v3::CorsPolicy as FilterCorsPolicy;
use envoy_types::pb::envoy::r#type::matcher::v3::{string_matcher::MatchPattern, StringMatcher};
use envoy_types::pb::google::protobuf::{Any, UInt32Value};
use tracing::warn;

use crate::xds::model::{
    BuildWarning, Built, ClusterTarget, CorsPolicy, DirectResponse, HeaderInjection,
    HeaderMatcher, RouteAction, RouteEntry, RouteEntryAction, RouteTableSpec, VirtualHostDraft,
    VirtualHostSpec, WeightedClusterSet, WeightedMember, WeightedSetError, CATCH_ALL_PREFIX,
    DEFAULT_ROUTE_TIMEOUT, SET_COOKIE_HEADER,
};
use crate::xds::resources::{
    any_from_message, to_proto_duration, BuiltResource, CORS_FILTER_NAME, CORS_POLICY_TYPE_URL,
    ROUTE_TYPE_URL,
};

fn rewrite_or_root(prefix_rewrite: &str) -> String {
    if prefix_rewrite.is_empty() {
        CATCH_ALL_PREFIX.to_string()
    } else {
        prefix_rewrite.to_string()
    }
}

/// Build a single-cluster route entry. An empty `prefix_rewrite` becomes
/// `/` and an empty `host_rewrite` means no rewrite.
pub fn build_route(
    prefix: &str,
    cluster: &str,
    match_headers: Vec<HeaderMatcher>,
    inject_headers: Vec<HeaderInjection>,
    prefix_rewrite: &str,
    host_rewrite: &str,
) -> RouteEntry {
    RouteEntry {
        prefix: prefix.to_string(),
        headers: match_headers,
        injections: inject_headers,
        action: RouteEntryAction::Route(RouteAction::Cluster(ClusterTarget {
            cluster: cluster.to_string(),
            prefix_rewrite: rewrite_or_root(prefix_rewrite),
            host_rewrite: Some(host_rewrite.to_string()).filter(|h| !h.is_empty()),
            timeout: DEFAULT_ROUTE_TIMEOUT,
        })),
    }
}

/// Build a weighted route entry. Members with weight 0 are dropped with a
/// warning; if none remain, or the weights overflow, no entry is produced.
/// `inject_headers` apply to the whole route; member injections stay scoped
/// to their member.
pub fn build_weighted_route(
    prefix: &str,
    match_headers: Vec<HeaderMatcher>,
    inject_headers: Vec<HeaderInjection>,
    members: Vec<WeightedMember>,
    prefix_rewrite: &str,
) -> Built<Option<RouteEntry>> {
    let mut warnings = Vec::new();

    let members: Vec<WeightedMember> = members
        .into_iter()
        .filter(|member| {
            if member.weight == 0 {
                warnings.push(BuildWarning::ZeroWeightMember {
                    prefix: prefix.to_string(),
                    cluster: member.cluster.clone(),
                });
                false
            } else {
                true
            }
        })
        .collect();

    let clusters = match WeightedClusterSet::new(members) {
        Ok(set) => set,
        Err(WeightedSetError::Overflow) => {
            warnings.push(BuildWarning::WeightOverflow { prefix: prefix.to_string() });
            return Built::new(None, warnings);
        }
        Err(_) => {
            warnings.push(BuildWarning::EmptyWeightedSet { prefix: prefix.to_string() });
            return Built::new(None, warnings);
        }
    };

    let entry = RouteEntry {
        prefix: prefix.to_string(),
        headers: match_headers,
        injections: inject_headers,
        action: RouteEntryAction::Route(RouteAction::Weighted {
            clusters,
            prefix_rewrite: rewrite_or_root(prefix_rewrite),
        }),
    };

    Built::new(Some(entry), warnings)
}

/// Build a route table. Input order is preserved, drafts without an action
/// are dropped with a warning, and every virtual host gets the catch-all
/// entry appended. Cluster references are not checked here.
pub fn build_route_table(
    name: &str,
    virtual_hosts: Vec<VirtualHostDraft>,
) -> Built<RouteTableSpec> {
    let mut warnings = Vec::new();

    let mut hosts: Vec<VirtualHostSpec> = virtual_hosts
        .into_iter()
        .map(|draft| {
            let mut routes = Vec::with_capacity(draft.routes.len() + 1);
            for route in draft.routes {
                let prefix = route.prefix.clone();
                match route.into_entry() {
                    Some(entry) => routes.push(entry),
                    None => {
                        warn!(
                            route_table = %name,
                            prefix = %prefix,
                            "Skipping route without an action"
                        );
                        warnings.push(BuildWarning::IncompleteRoute { prefix });
                    }
                }
            }
            routes.push(RouteEntry::catch_all());

            VirtualHostSpec { name: draft.name, domains: draft.domains, routes, cors: draft.cors }
        })
        .collect();

    if hosts.is_empty() {
        hosts.push(VirtualHostSpec {
            name: "default".to_string(),
            domains: vec!["*".to_string()],
            routes: vec![RouteEntry::catch_all()],
            cors: None,
        });
    }

    Built::new(RouteTableSpec { name: name.to_string(), virtual_hosts: hosts }, warnings)
}

/// Synthetic table served when a listener's named route table is missing.
pub fn missing_route_table(name: &str, body: &str) -> RouteTableSpec {
    RouteTableSpec {
        name: name.to_string(),
        virtual_hosts: vec![VirtualHostSpec {
            name: "default".to_string(),
            domains: vec!["*".to_string()],
            routes: vec![RouteEntry {
                prefix: CATCH_ALL_PREFIX.to_string(),
                headers: Vec::new(),
                injections: Vec::new(),
                action: RouteEntryAction::DirectResponse(DirectResponse::not_found(body)),
            }],
            cors: None,
        }],
    }
}

impl RouteTableSpec {
    /// Convert to an envoy-types RouteConfiguration
    pub fn to_envoy_route_configuration(&self) -> RouteConfiguration {
        RouteConfiguration {
            name: self.name.clone(),
            virtual_hosts: self.virtual_hosts.iter().map(|vh| vh.to_envoy_virtual_host()).collect(),
            ..Default::default()
        }
    }

    pub fn to_built_resource(&self) -> BuiltResource {
        BuiltResource::encode(
            self.name.clone(),
            ROUTE_TYPE_URL,
            &self.to_envoy_route_configuration(),
        )
    }
}

impl VirtualHostSpec {
    fn to_envoy_virtual_host(&self) -> VirtualHost {
        let mut virtual_host = VirtualHost {
            name: self.name.clone(),
            domains: self.domains.clone(),
            routes: self.routes.iter().map(|r| r.to_envoy_route()).collect(),
            ..Default::default()
        };

        if let Some(cors) = &self.cors {
            virtual_host
                .typed_per_filter_config
                .insert(CORS_FILTER_NAME.to_string(), cors.to_any());
        }

        virtual_host
    }
}

impl CorsPolicy {
    /// Per-route config for the CORS HTTP filter
    pub fn to_any(&self) -> Any {
        let policy = FilterCorsPolicy {
            allow_origin_string_match: self
                .allow_origins
                .iter()
                .map(|o| exact_matcher(o))
                .collect(),
            allow_methods: self.allow_methods.clone(),
            allow_headers: self.allow_headers.clone(),
            expose_headers: self.expose_headers.clone(),
            ..Default::default()
        };
        any_from_message(CORS_POLICY_TYPE_URL, &policy)
    }
}

impl RouteEntry {
    fn to_envoy_route(&self) -> Route {
        let route_match = RouteMatch {
            path_specifier: Some(PathSpecifier::Prefix(self.prefix.clone())),
            headers: self.headers.iter().map(to_envoy_header_matcher).collect(),
            ..Default::default()
        };

        let action = match &self.action {
            RouteEntryAction::DirectResponse(response) => {
                Action::DirectResponse(DirectResponseAction {
                    status: response.status,
                    body: Some(DataSource {
                        specifier: Some(DataSourceSpecifier::InlineString(response.body.clone())),
                        ..Default::default()
                    }),
                    ..Default::default()
                })
            }
            RouteEntryAction::Route(route_action) => {
                Action::Route(to_envoy_route_action(route_action))
            }
        };

        let (request_headers_to_add, response_headers_to_add) = injection_headers(&self.injections);

        Route {
            r#match: Some(route_match),
            action: Some(action),
            request_headers_to_add,
            response_headers_to_add,
            ..Default::default()
        }
    }
}

#[allow(deprecated)]
fn to_envoy_route_action(action: &RouteAction) -> EnvoyRouteAction {
    match action {
        RouteAction::Cluster(target) => EnvoyRouteAction {
            cluster_specifier: Some(ClusterSpecifier::Cluster(target.cluster.clone())),
            prefix_rewrite: target.prefix_rewrite.clone(),
            host_rewrite_specifier: target
                .host_rewrite
                .clone()
                .map(HostRewriteSpecifier::HostRewriteLiteral),
            timeout: Some(to_proto_duration(target.timeout)),
            ..Default::default()
        },
        RouteAction::Weighted { clusters, prefix_rewrite } => {
            let weights = clusters
                .members()
                .iter()
                .map(|member| {
                    let (request_headers_to_add, response_headers_to_add) =
                        injection_headers(&member.injections);
                    ClusterWeight {
                        name: member.cluster.clone(),
                        weight: Some(UInt32Value { value: member.weight }),
                        request_headers_to_add,
                        response_headers_to_add,
                        ..Default::default()
                    }
                })
                .collect();

            EnvoyRouteAction {
                cluster_specifier: Some(ClusterSpecifier::WeightedClusters(WeightedCluster {
                    clusters: weights,
                    total_weight: Some(UInt32Value { value: clusters.total_weight() }),
                    ..Default::default()
                })),
                prefix_rewrite: prefix_rewrite.clone(),
                timeout: Some(to_proto_duration(DEFAULT_ROUTE_TIMEOUT)),
                ..Default::default()
            }
        }
    }
}

/// One request header-add and one response cookie-add per injection.
fn injection_headers(
    injections: &[HeaderInjection],
) -> (Vec<HeaderValueOption>, Vec<HeaderValueOption>) {
    let requests = injections.iter().map(|i| header_option(&i.key, &i.value)).collect();
    let responses = injections
        .iter()
        .map(|i| header_option(SET_COOKIE_HEADER, &i.cookie_directive()))
        .collect();
    (requests, responses)
}

fn header_option(key: &str, value: &str) -> HeaderValueOption {
    HeaderValueOption {
        header: Some(HeaderValue {
            key: key.to_string(),
            value: value.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn exact_matcher(value: &str) -> StringMatcher {
    StringMatcher {
        match_pattern: Some(MatchPattern::Exact(value.to_string())),
        ..Default::default()
    }
}

fn to_envoy_header_matcher(matcher: &HeaderMatcher) -> EnvoyHeaderMatcher {
    EnvoyHeaderMatcher {
        name: matcher.name.clone(),
        header_match_specifier: Some(HeaderMatchSpecifier::StringMatch(exact_matcher(
            &matcher.exact_value,
        ))),
        ..Default::default()
    }
}
