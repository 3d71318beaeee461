//! Typed resource model for the routing graph.
//!
//! Values here are plain data. The builders in [`crate::xds::cluster`],
//! [`crate::xds::route`] and [`crate::xds::listener`] produce them, and the
//! same modules convert them into envoy-types protobufs.

use std::fmt;
use std::time::Duration;

/// Prefix matched by the trailing catch-all entry of every virtual host.
pub const CATCH_ALL_PREFIX: &str = "/";
/// Body returned by the catch-all entry.
pub const CATCH_ALL_BODY: &str = "Invalid API Route";
/// Body returned by the synthetic table a listener uses when its route table is missing.
pub const MISSING_ROUTE_TABLE_BODY: &str = "Route configuration not found";
/// Response header mirroring each injected request header.
pub const SET_COOKIE_HEADER: &str = "Set-Cookie";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_ROUTE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_UPSTREAM_PORT: u16 = 80;
pub const TLS_UPSTREAM_PORT: u16 = 443;

/// How Envoy resolves a cluster's upstream host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryType {
    #[default]
    StrictDns,
    LogicalDns,
}

impl DiscoveryType {
    /// Case-insensitive and total: anything unrecognised is `StrictDns`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "LOGICAL_DNS" | "LOGICALDNS" => Self::LogicalDns,
            _ => Self::StrictDns,
        }
    }
}

/// Address family used for DNS resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DnsLookupFamily {
    V4Only,
    V6Only,
    #[default]
    Auto,
}

impl DnsLookupFamily {
    /// Case-insensitive and total: anything unrecognised is `Auto`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "V4_ONLY" | "V4ONLY" => Self::V4Only,
            "V6_ONLY" | "V6ONLY" => Self::V6Only,
            _ => Self::Auto,
        }
    }
}

/// Marker that a cluster talks TLS to its upstream, with the SNI to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTls {
    pub sni: String,
}

/// A named upstream. Replaced whole by name, never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub discovery_type: DiscoveryType,
    pub dns_lookup_family: DnsLookupFamily,
    pub tls: Option<UpstreamTls>,
    pub connect_timeout: Duration,
}

impl ClusterSpec {
    pub fn uses_tls(&self) -> bool {
        self.tls.is_some()
    }
}

/// Exact-value request header match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMatcher {
    pub name: String,
    pub exact_value: String,
}

impl HeaderMatcher {
    pub fn new(name: impl Into<String>, exact_value: impl Into<String>) -> Self {
        Self { name: name.into(), exact_value: exact_value.into() }
    }
}

/// A header added to upstream requests and mirrored back as a cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInjection {
    pub key: String,
    pub value: String,
}

impl HeaderInjection {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    /// Value of the `Set-Cookie` response header mirroring this injection.
    pub fn cookie_directive(&self) -> String {
        format!("{}={}; Path=/; SameSite=Lax", self.key, self.value)
    }
}

/// Literal response served by the proxy without contacting an upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectResponse {
    pub status: u32,
    pub body: String,
}

impl DirectResponse {
    pub fn not_found(body: impl Into<String>) -> Self {
        Self { status: 404, body: body.into() }
    }
}

/// Forwarding to one named cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTarget {
    pub cluster: String,
    pub prefix_rewrite: String,
    pub host_rewrite: Option<String>,
    pub timeout: Duration,
}

/// One member of a weighted split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedMember {
    pub cluster: String,
    pub weight: u32,
    pub injections: Vec<HeaderInjection>,
}

/// Why a weighted set could not be formed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WeightedSetError {
    #[error("weighted set has no members")]
    Empty,
    #[error("member '{cluster}' has weight 0")]
    ZeroWeight { cluster: String },
    #[error("member weights overflow u32")]
    Overflow,
}

/// Ordered weighted split. The total is computed once at construction and
/// always equals the sum of member weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedClusterSet {
    members: Vec<WeightedMember>,
    total_weight: u32,
}

impl WeightedClusterSet {
    pub fn new(members: Vec<WeightedMember>) -> Result<Self, WeightedSetError> {
        if members.is_empty() {
            return Err(WeightedSetError::Empty);
        }

        let mut total: u32 = 0;
        for member in &members {
            if member.weight == 0 {
                return Err(WeightedSetError::ZeroWeight { cluster: member.cluster.clone() });
            }
            total = total.checked_add(member.weight).ok_or(WeightedSetError::Overflow)?;
        }

        Ok(Self { members, total_weight: total })
    }

    pub fn members(&self) -> &[WeightedMember] {
        &self.members
    }

    pub fn total_weight(&self) -> u32 {
        self.total_weight
    }
}

/// Where matched traffic is forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    Cluster(ClusterTarget),
    Weighted { clusters: WeightedClusterSet, prefix_rewrite: String },
}

/// The single action of a route entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteEntryAction {
    DirectResponse(DirectResponse),
    Route(RouteAction),
}

/// One prefix match inside a virtual host. First match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub prefix: String,
    pub headers: Vec<HeaderMatcher>,
    pub injections: Vec<HeaderInjection>,
    pub action: RouteEntryAction,
}

impl RouteEntry {
    /// The trailing 404 entry appended to every virtual host.
    pub fn catch_all() -> Self {
        Self {
            prefix: CATCH_ALL_PREFIX.to_string(),
            headers: Vec::new(),
            injections: Vec::new(),
            action: RouteEntryAction::DirectResponse(DirectResponse::not_found(CATCH_ALL_BODY)),
        }
    }

    pub fn is_catch_all(&self) -> bool {
        self.prefix == CATCH_ALL_PREFIX
            && self.headers.is_empty()
            && matches!(
                &self.action,
                RouteEntryAction::DirectResponse(resp)
                    if resp.status == 404 && resp.body == CATCH_ALL_BODY
            )
    }

    /// Cluster names this entry forwards to.
    pub fn referenced_clusters(&self) -> Vec<&str> {
        match &self.action {
            RouteEntryAction::DirectResponse(_) => Vec::new(),
            RouteEntryAction::Route(RouteAction::Cluster(target)) => vec![target.cluster.as_str()],
            RouteEntryAction::Route(RouteAction::Weighted { clusters, .. }) => {
                clusters.members().iter().map(|m| m.cluster.as_str()).collect()
            }
        }
    }
}

/// A route entry that may still lack an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDraft {
    pub prefix: String,
    pub headers: Vec<HeaderMatcher>,
    pub injections: Vec<HeaderInjection>,
    pub action: Option<RouteEntryAction>,
}

impl RouteDraft {
    /// A draft with no action, for declarations that name neither a cluster
    /// nor a weighted split.
    pub fn incomplete(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), headers: Vec::new(), injections: Vec::new(), action: None }
    }

    pub fn into_entry(self) -> Option<RouteEntry> {
        let action = self.action?;
        Some(RouteEntry {
            prefix: self.prefix,
            headers: self.headers,
            injections: self.injections,
            action,
        })
    }
}

impl From<RouteEntry> for RouteDraft {
    fn from(entry: RouteEntry) -> Self {
        Self {
            prefix: entry.prefix,
            headers: entry.headers,
            injections: entry.injections,
            action: Some(entry.action),
        }
    }
}

/// CORS settings attached to a virtual host. Origins match exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsPolicy {
    pub allow_origins: Vec<String>,
    pub allow_methods: String,
    pub allow_headers: String,
    pub expose_headers: String,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: "GET, POST, OPTIONS".to_string(),
            allow_headers: "X-Stack-Version, Content-Type".to_string(),
            expose_headers: "X-Stack-Version".to_string(),
        }
    }
}

/// Virtual host as handed to the table builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHostDraft {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<RouteDraft>,
    pub cors: Option<CorsPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHostSpec {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<RouteEntry>,
    pub cors: Option<CorsPolicy>,
}

/// A named route table. Every virtual host ends with the catch-all entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableSpec {
    pub name: String,
    pub virtual_hosts: Vec<VirtualHostSpec>,
}

impl RouteTableSpec {
    pub fn referenced_clusters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .virtual_hosts
            .iter()
            .flat_map(|vh| vh.routes.iter())
            .flat_map(|route| route.referenced_clusters())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Route source of a listener's connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerRoute {
    /// Fetched over ADS by name.
    Rds(String),
    /// Embedded table, used when the named table is absent.
    Inline(RouteTableSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSpec {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub route: ListenerRoute,
}

/// A non-fatal problem found while building the graph. The affected entry
/// is skipped and the rest of the request proceeds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildWarning {
    #[error("route '{prefix}' has neither a cluster nor weighted clusters; skipped")]
    IncompleteRoute { prefix: String },

    #[error("weighted member '{cluster}' on route '{prefix}' has weight 0; dropped")]
    ZeroWeightMember { prefix: String, cluster: String },

    #[error("route '{prefix}' has no usable weighted members; skipped")]
    EmptyWeightedSet { prefix: String },

    #[error("route '{prefix}' weights overflow; skipped")]
    WeightOverflow { prefix: String },

    #[error("cluster '{name}' declared more than once; last declaration wins")]
    DuplicateCluster { name: String },

    #[error("route table '{route_table}' references unknown cluster '{cluster}'")]
    UnresolvedCluster { route_table: String, cluster: String },
}

/// A built value plus the warnings produced while building it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Built<T> {
    pub value: T,
    pub warnings: Vec<BuildWarning>,
}

impl<T> Built<T> {
    pub fn new(value: T, warnings: Vec<BuildWarning>) -> Self {
        Self { value, warnings }
    }
}

impl fmt::Display for DiscoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StrictDns => f.write_str("STRICT_DNS"),
            Self::LogicalDns => f.write_str("LOGICAL_DNS"),
        }
    }
}

impl fmt::Display for DnsLookupFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4Only => f.write_str("V4_ONLY"),
            Self::V6Only => f.write_str("V6_ONLY"),
            Self::Auto => f.write_str("AUTO"),
        }
    }
}
