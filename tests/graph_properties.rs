//! Property tests for the graph builders and snapshot publishing

use proptest::prelude::*;
use routeplane::config::GraphConfig;
use routeplane::xds::cluster::build_cluster;
use routeplane::xds::declaration::{compile, RouteDeclaration};
use routeplane::xds::model::{
    HeaderInjection, RouteAction, RouteDraft, RouteEntry, RouteEntryAction, VirtualHostDraft,
    WeightedMember, SET_COOKIE_HEADER, TLS_UPSTREAM_PORT,
};
use routeplane::xds::resources::ResourceKind;
use routeplane::xds::route::{build_route, build_route_table, build_weighted_route};
use routeplane::xds::{ConfigStore, Snapshot, SnapshotCache, SnapshotPublisher};

fn declaration(prefix: String, cluster: String) -> RouteDeclaration {
    RouteDeclaration { prefix, cluster, ..Default::default() }
}

fn single_host(routes: Vec<RouteDraft>) -> Vec<VirtualHostDraft> {
    vec![VirtualHostDraft { name: "vh".into(), domains: vec!["*".into()], routes, cors: None }]
}

proptest! {
    #[test]
    fn tls_always_forces_port_443(port in 1u16.., host in "[a-z]{1,12}") {
        let spec = build_cluster("c", &host, port, "", "", true);
        prop_assert_eq!(spec.port, TLS_UPSTREAM_PORT);
        prop_assert_eq!(spec.tls.map(|t| t.sni), Some(host));
    }

    #[test]
    fn plain_clusters_keep_their_port(port in 1u16..) {
        let spec = build_cluster("c", "host", port, "", "", false);
        prop_assert_eq!(spec.port, port);
        prop_assert!(spec.tls.is_none());
    }

    #[test]
    fn weighted_total_equals_sum_of_kept_weights(
        weights in prop::collection::vec(0u32..1000, 1..8),
    ) {
        let members: Vec<WeightedMember> = weights
            .iter()
            .enumerate()
            .map(|(i, w)| WeightedMember {
                cluster: format!("c{}", i),
                weight: *w,
                injections: vec![],
            })
            .collect();

        let built = build_weighted_route("/s", vec![], vec![], members, "");
        let zeros = weights.iter().filter(|w| **w == 0).count();
        let kept_sum: u32 = weights.iter().filter(|w| **w > 0).sum();
        prop_assert_eq!(built.warnings.len(), zeros + usize::from(kept_sum == 0));

        match built.value {
            Some(entry) => {
                let RouteEntryAction::Route(RouteAction::Weighted { clusters, .. }) = entry.action
                else {
                    return Err(TestCaseError::fail("expected weighted action"));
                };
                prop_assert_eq!(clusters.total_weight(), kept_sum);
                prop_assert!(clusters.members().iter().all(|m| m.weight > 0));
                prop_assert_eq!(clusters.members().len(), weights.len() - zeros);
            }
            None => prop_assert_eq!(kept_sum, 0),
        }
    }

    #[test]
    fn catch_all_is_always_last(prefixes in prop::collection::vec("/[a-z]{0,6}", 0..6)) {
        let routes: Vec<RouteDraft> = prefixes
            .iter()
            .map(|p| build_route(p, "svc", vec![], vec![], "", "").into())
            .collect();
        let table = build_route_table("t", single_host(routes)).value;

        let vh = &table.virtual_hosts[0];
        prop_assert_eq!(vh.routes.len(), prefixes.len() + 1);
        prop_assert!(vh.routes.last().map(RouteEntry::is_catch_all).unwrap_or(false));
        for (entry, prefix) in vh.routes.iter().zip(prefixes.iter()) {
            prop_assert_eq!(&entry.prefix, prefix);
        }
    }

    #[test]
    fn every_injection_adds_one_header_and_one_cookie(
        pairs in prop::collection::vec(("[a-z]{1,8}", "[a-z0-9]{0,8}"), 0..5),
        weighted in any::<bool>(),
    ) {
        let injections: Vec<HeaderInjection> =
            pairs.iter().map(|(k, v)| HeaderInjection::new(k.as_str(), v.as_str())).collect();
        let entry = if weighted {
            let member = WeightedMember { cluster: "svc".into(), weight: 1, injections: vec![] };
            let members = vec![member];
            build_weighted_route("/a", vec![], injections, members, "").value.unwrap()
        } else {
            build_route("/a", "svc", vec![], injections, "", "")
        };

        let config = build_route_table("t", single_host(vec![entry.into()]))
            .value
            .to_envoy_route_configuration();
        let route = &config.virtual_hosts[0].routes[0];

        prop_assert_eq!(route.request_headers_to_add.len(), pairs.len());
        prop_assert_eq!(route.response_headers_to_add.len(), pairs.len());

        for (i, (key, value)) in pairs.iter().enumerate() {
            let header = route.request_headers_to_add[i].header.as_ref().unwrap();
            prop_assert_eq!(&header.key, key);
            prop_assert_eq!(&header.value, value);

            let cookie = route.response_headers_to_add[i].header.as_ref().unwrap();
            prop_assert_eq!(cookie.key.as_str(), SET_COOKIE_HEADER);
            let expected = format!("{}={}; Path=/; SameSite=Lax", key, value);
            prop_assert_eq!(&cookie.value, &expected);
        }
    }

    #[test]
    fn versions_strictly_increase(publishes in 1usize..10) {
        let mut publisher = SnapshotPublisher::new("node");
        let cache = SnapshotCache::new();
        let store = ConfigStore::default();

        let mut last = 0u64;
        for _ in 0..publishes {
            let snapshot = publisher.publish(&store, &cache).unwrap();
            prop_assert!(snapshot.sequence() > last);
            prop_assert_eq!(snapshot.version(), format!("v{}", snapshot.sequence()));
            last = snapshot.sequence();
        }
        prop_assert_eq!(publisher.last_version(), publishes as u64);
    }

    #[test]
    fn same_input_encodes_to_same_bytes(names in prop::collection::btree_set("[a-z]{1,8}", 1..6)) {
        let graph = GraphConfig::default();
        let forward: Vec<RouteDeclaration> =
            names.iter().map(|n| declaration(format!("/{}", n), n.clone())).collect();

        let build = |decls: &[RouteDeclaration], sequence: u64| {
            let compiled = compile(decls, &graph);
            let mut store = ConfigStore::default();
            store.replace_clusters(compiled.clusters);
            store.replace_route_table(compiled.route_table);
            Snapshot::from_store(sequence, &store).unwrap()
        };

        let first = build(&forward, 1);
        let second = build(&forward, 2);
        prop_assert!(first.same_resources(&second));
        prop_assert_eq!(
            first.resource_names(ResourceKind::Cluster),
            names.iter().cloned().collect::<Vec<_>>()
        );
    }
}
