//! Listener building and conversion using envoy-types

use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, config_source::ConfigSourceSpecifier,
    socket_address::PortSpecifier, AggregatedConfigSource, ApiVersion, ConfigSource, SocketAddress,
    Address,
};
use envoy_types::pb::envoy::config::listener::v3::{
    filter::ConfigType as FilterConfigType, Filter, FilterChain, Listener,
};
use envoy_types::pb::envoy::extensions::filters::http::cors::v3::Cors as CorsFilter;
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router as RouterFilter;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::{CodecType, RouteSpecifier},
    http_filter::ConfigType as HttpFilterConfigType,
    HttpConnectionManager, HttpFilter, Rds,
};
use tracing::{debug, warn};

use crate::xds::model::{ListenerRoute, ListenerSpec, MISSING_ROUTE_TABLE_BODY};
use crate::xds::resources::{
    any_from_message, BuiltResource, CORS_FILTER_NAME, CORS_FILTER_TYPE_URL,
    HTTP_CONNECTION_MANAGER_NAME, HTTP_CONNECTION_MANAGER_TYPE_URL, LISTENER_TYPE_URL,
    ROUTER_FILTER_NAME, ROUTER_FILTER_TYPE_URL,
};
use crate::xds::route::missing_route_table;
use crate::xds::store::ConfigStore;

const STAT_PREFIX: &str = "ingress_http";

/// Build a listener bound to `address:port`. The connection manager fetches
/// `route_table_name` over ADS when the store holds it; otherwise it embeds
/// a table that answers every request with 404.
pub fn build_listener(
    name: &str,
    address: &str,
    port: u16,
    route_table_name: &str,
    store: &ConfigStore,
) -> ListenerSpec {
    let route = if store.route_table(route_table_name).is_some() {
        ListenerRoute::Rds(route_table_name.to_string())
    } else {
        warn!(
            listener = %name,
            route_table = %route_table_name,
            "Route table not found; listener will serve an inline 404 table"
        );
        ListenerRoute::Inline(missing_route_table(route_table_name, MISSING_ROUTE_TABLE_BODY))
    };

    debug!(listener = %name, address = %address, port, "Built listener");

    ListenerSpec { name: name.to_string(), address: address.to_string(), port, route }
}

impl ListenerSpec {
    /// Convert to an envoy-types Listener
    pub fn to_envoy_listener(&self) -> Listener {
        let route_specifier = match &self.route {
            ListenerRoute::Rds(route_name) => RouteSpecifier::Rds(Rds {
                route_config_name: route_name.clone(),
                config_source: Some(ConfigSource {
                    resource_api_version: ApiVersion::V3 as i32,
                    config_source_specifier: Some(ConfigSourceSpecifier::Ads(
                        AggregatedConfigSource::default(),
                    )),
                    ..Default::default()
                }),
            }),
            ListenerRoute::Inline(table) => {
                RouteSpecifier::RouteConfig(table.to_envoy_route_configuration())
            }
        };

        let hcm = HttpConnectionManager {
            stat_prefix: STAT_PREFIX.to_string(),
            codec_type: CodecType::Auto as i32,
            route_specifier: Some(route_specifier),
            http_filters: vec![
                http_filter(CORS_FILTER_NAME, CORS_FILTER_TYPE_URL, &CorsFilter::default()),
                http_filter(ROUTER_FILTER_NAME, ROUTER_FILTER_TYPE_URL, &RouterFilter::default()),
            ],
            ..Default::default()
        };

        Listener {
            name: self.name.clone(),
            address: Some(Address {
                address: Some(AddressType::SocketAddress(SocketAddress {
                    address: self.address.clone(),
                    port_specifier: Some(PortSpecifier::PortValue(u32::from(self.port))),
                    ..Default::default()
                })),
            }),
            filter_chains: vec![FilterChain {
                filters: vec![Filter {
                    name: HTTP_CONNECTION_MANAGER_NAME.to_string(),
                    config_type: Some(FilterConfigType::TypedConfig(any_from_message(
                        HTTP_CONNECTION_MANAGER_TYPE_URL,
                        &hcm,
                    ))),
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    pub fn to_built_resource(&self) -> BuiltResource {
        BuiltResource::encode(self.name.clone(), LISTENER_TYPE_URL, &self.to_envoy_listener())
    }

    /// Name of the route table fetched over ADS, if any.
    pub fn rds_route_name(&self) -> Option<&str> {
        match &self.route {
            ListenerRoute::Rds(name) => Some(name),
            ListenerRoute::Inline(_) => None,
        }
    }
}

fn http_filter<M: prost::Message>(name: &str, type_url: &str, message: &M) -> HttpFilter {
    HttpFilter {
        name: name.to_string(),
        config_type: Some(HttpFilterConfigType::TypedConfig(any_from_message(type_url, message))),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xds::route::build_route_table;
    use prost::Message;

    fn decode_hcm(listener: &Listener) -> HttpConnectionManager {
        let filter = &listener.filter_chains[0].filters[0];
        assert_eq!(filter.name, HTTP_CONNECTION_MANAGER_NAME);
        match filter.config_type.as_ref() {
            Some(FilterConfigType::TypedConfig(any)) => {
                assert_eq!(any.type_url, HTTP_CONNECTION_MANAGER_TYPE_URL);
                HttpConnectionManager::decode(&*any.value).expect("decode hcm")
            }
            other => panic!("unexpected filter config: {:?}", other),
        }
    }

    #[test]
    fn listener_uses_rds_when_table_exists() {
        let mut store = ConfigStore::default();
        store.replace_route_table(build_route_table("local_routes", vec![]).value);

        let spec = build_listener("local_listener", "0.0.0.0", 8080, "local_routes", &store);
        assert_eq!(spec.rds_route_name(), Some("local_routes"));

        let hcm = decode_hcm(&spec.to_envoy_listener());
        assert_eq!(hcm.stat_prefix, "ingress_http");
        assert_eq!(hcm.codec_type, CodecType::Auto as i32);
        let Some(RouteSpecifier::Rds(rds)) = hcm.route_specifier else { panic!("expected rds") };
        assert_eq!(rds.route_config_name, "local_routes");
        let names: Vec<_> = hcm.http_filters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec![CORS_FILTER_NAME, ROUTER_FILTER_NAME]);
    }

    #[test]
    fn listener_falls_back_to_inline_404() {
        let store = ConfigStore::default();
        let spec = build_listener("local_listener", "0.0.0.0", 8080, "local_routes", &store);
        assert!(spec.rds_route_name().is_none());

        let hcm = decode_hcm(&spec.to_envoy_listener());
        let Some(RouteSpecifier::RouteConfig(config)) = hcm.route_specifier else {
            panic!("expected inline route config");
        };
        assert_eq!(config.virtual_hosts[0].name, "default");
        assert_eq!(config.virtual_hosts[0].domains, vec!["*".to_string()]);
    }

    #[test]
    fn listener_address_and_port() {
        let spec = build_listener("l", "127.0.0.1", 10000, "t", &ConfigStore::default());
        let listener = spec.to_envoy_listener();
        let Some(AddressType::SocketAddress(sa)) = listener.address.unwrap().address else {
            panic!("expected socket address");
        };
        assert_eq!(sa.address, "127.0.0.1");
        assert_eq!(sa.port_specifier, Some(PortSpecifier::PortValue(10000)));
    }
}
