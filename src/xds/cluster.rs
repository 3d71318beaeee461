//! Cluster building and conversion using envoy-types
//!
//! [`build_cluster`] turns loosely typed declaration values into a
//! [`ClusterSpec`]. [`ClusterSpec::to_envoy_cluster`] renders it as an Envoy
//! `Cluster` with a single DNS-resolved endpoint and round-robin balancing.

use envoy_types::pb::envoy::config::cluster::v3::cluster::{
    ClusterDiscoveryType, DiscoveryType as EnvoyDiscoveryType,
    DnsLookupFamily as EnvoyDnsLookupFamily, LbPolicy,
};
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType,
    socket_address::{PortSpecifier, Protocol},
    transport_socket::ConfigType as TransportSocketConfigType,
    Address, SocketAddress, TransportSocket,
};
use envoy_types::pb::envoy::config::endpoint::v3::{
    lb_endpoint, ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints,
};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    CommonTlsContext, UpstreamTlsContext,
};
use tracing::debug;

use crate::xds::model::{
    ClusterSpec, DiscoveryType, DnsLookupFamily, UpstreamTls, DEFAULT_CONNECT_TIMEOUT,
    TLS_UPSTREAM_PORT,
};
use crate::xds::resources::{
    any_from_message, to_proto_duration, BuiltResource, CLUSTER_TYPE_URL,
    TLS_TRANSPORT_SOCKET_NAME, UPSTREAM_TLS_CONTEXT_TYPE_URL,
};

/// Build a cluster from declaration values. Never fails: unknown discovery
/// types and DNS families fall back to their defaults. When `tls` is set the
/// port is forced to 443 and the host becomes the SNI name.
pub fn build_cluster(
    name: &str,
    host: &str,
    port: u16,
    discovery_type: &str,
    dns_lookup_family: &str,
    tls: bool,
) -> ClusterSpec {
    let (port, tls) = if tls {
        (TLS_UPSTREAM_PORT, Some(UpstreamTls { sni: host.to_string() }))
    } else {
        (port, None)
    };

    let spec = ClusterSpec {
        name: name.to_string(),
        host: host.to_string(),
        port,
        discovery_type: DiscoveryType::parse(discovery_type),
        dns_lookup_family: DnsLookupFamily::parse(dns_lookup_family),
        tls,
        connect_timeout: DEFAULT_CONNECT_TIMEOUT,
    };

    debug!(
        cluster = %spec.name,
        host = %spec.host,
        port = spec.port,
        discovery_type = %spec.discovery_type,
        dns_lookup_family = %spec.dns_lookup_family,
        tls = spec.uses_tls(),
        "Built cluster"
    );

    spec
}

impl ClusterSpec {
    /// Convert to an envoy-types Cluster
    pub fn to_envoy_cluster(&self) -> Cluster {
        let endpoint = LbEndpoint {
            host_identifier: Some(lb_endpoint::HostIdentifier::Endpoint(Endpoint {
                address: Some(Address {
                    address: Some(AddressType::SocketAddress(SocketAddress {
                        address: self.host.clone(),
                        port_specifier: Some(PortSpecifier::PortValue(u32::from(self.port))),
                        protocol: Protocol::Tcp as i32,
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })),
            ..Default::default()
        };

        let discovery_type = match self.discovery_type {
            DiscoveryType::StrictDns => EnvoyDiscoveryType::StrictDns,
            DiscoveryType::LogicalDns => EnvoyDiscoveryType::LogicalDns,
        };

        let dns_lookup_family = match self.dns_lookup_family {
            DnsLookupFamily::V4Only => EnvoyDnsLookupFamily::V4Only,
            DnsLookupFamily::V6Only => EnvoyDnsLookupFamily::V6Only,
            DnsLookupFamily::Auto => EnvoyDnsLookupFamily::Auto,
        };

        Cluster {
            name: self.name.clone(),
            connect_timeout: Some(to_proto_duration(self.connect_timeout)),
            cluster_discovery_type: Some(ClusterDiscoveryType::Type(discovery_type as i32)),
            dns_lookup_family: dns_lookup_family as i32,
            lb_policy: LbPolicy::RoundRobin as i32,
            load_assignment: Some(ClusterLoadAssignment {
                cluster_name: self.name.clone(),
                endpoints: vec![LocalityLbEndpoints {
                    lb_endpoints: vec![endpoint],
                    ..Default::default()
                }],
                ..Default::default()
            }),
            transport_socket: self.tls.as_ref().map(upstream_tls_socket),
            ..Default::default()
        }
    }

    pub fn to_built_resource(&self) -> BuiltResource {
        BuiltResource::encode(self.name.clone(), CLUSTER_TYPE_URL, &self.to_envoy_cluster())
    }
}

fn upstream_tls_socket(tls: &UpstreamTls) -> TransportSocket {
    let tls_context = UpstreamTlsContext {
        common_tls_context: Some(CommonTlsContext::default()),
        sni: tls.sni.clone(),
        ..Default::default()
    };

    TransportSocket {
        name: TLS_TRANSPORT_SOCKET_NAME.to_string(),
        config_type: Some(TransportSocketConfigType::TypedConfig(any_from_message(
            UPSTREAM_TLS_CONTEXT_TYPE_URL,
            &tls_context,
        ))),
    }
}
