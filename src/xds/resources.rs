//! Type URLs and encoding helpers shared by the resource builders.

use envoy_types::pb::google::protobuf::{Any, Duration as ProtoDuration};
use prost::Message;

pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";

pub const UPSTREAM_TLS_CONTEXT_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.UpstreamTlsContext";
pub const HTTP_CONNECTION_MANAGER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
pub const ROUTER_FILTER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router";
pub const CORS_FILTER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.cors.v3.Cors";
pub const CORS_POLICY_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.cors.v3.CorsPolicy";

pub const TLS_TRANSPORT_SOCKET_NAME: &str = "envoy.transport_sockets.tls";
pub const HTTP_CONNECTION_MANAGER_NAME: &str = "envoy.filters.network.http_connection_manager";
pub const ROUTER_FILTER_NAME: &str = "envoy.filters.http.router";
pub const CORS_FILTER_NAME: &str = "envoy.filters.http.cors";

/// The three resource types the control plane serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Cluster,
    Route,
    Listener,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Cluster, Self::Route, Self::Listener];

    pub fn type_url(self) -> &'static str {
        match self {
            Self::Cluster => CLUSTER_TYPE_URL,
            Self::Route => ROUTE_TYPE_URL,
            Self::Listener => LISTENER_TYPE_URL,
        }
    }

    pub fn from_type_url(type_url: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_url() == type_url)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cluster => "clusters",
            Self::Route => "routes",
            Self::Listener => "listeners",
        }
    }
}

/// Wrapper for a built Envoy resource along with its name.
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltResource {
    pub name: String,
    pub resource: Any,
}

impl BuiltResource {
    pub fn encode<M: Message>(name: impl Into<String>, type_url: &str, message: &M) -> Self {
        Self { name: name.into(), resource: any_from_message(type_url, message) }
    }

    pub fn into_any(self) -> Any {
        self.resource
    }

    pub fn type_url(&self) -> &str {
        &self.resource.type_url
    }
}

/// Pack a protobuf message into an `Any`.
pub fn any_from_message<M: Message>(type_url: impl Into<String>, message: &M) -> Any {
    Any { type_url: type_url.into(), value: message.encode_to_vec() }
}

pub fn to_proto_duration(value: std::time::Duration) -> ProtoDuration {
    ProtoDuration { seconds: value.as_secs() as i64, nanos: value.subsec_nanos() as i32 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envoy_types::pb::envoy::config::cluster::v3::Cluster;

    #[test]
    fn resource_kind_round_trips_type_urls() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_type_url(kind.type_url()), Some(kind));
        }
        assert_eq!(ResourceKind::from_type_url("type.googleapis.com/unknown"), None);
    }

    #[test]
    fn built_resource_carries_type_url() {
        let cluster = Cluster { name: "payments".into(), ..Default::default() };
        let built = BuiltResource::encode("payments", CLUSTER_TYPE_URL, &cluster);
        assert_eq!(built.type_url(), CLUSTER_TYPE_URL);
        let decoded = Cluster::decode(&*built.into_any().value).unwrap();
        assert_eq!(decoded.name, "payments");
    }

    #[test]
    fn duration_conversion_keeps_subsecond_part() {
        let d = to_proto_duration(std::time::Duration::from_millis(1500));
        assert_eq!(d.seconds, 1);
        assert_eq!(d.nanos, 500_000_000);
    }
}
