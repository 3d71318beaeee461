//! Integration tests for the administrative REST API
//!
//! Requests are driven through the router with `oneshot`, so no sockets
//! are opened. Each test owns a fresh `XdsState`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use routeplane::api::build_router;
use routeplane::config::GraphConfig;
use routeplane::xds::XdsState;
use serde_json::Value;
use tower::ServiceExt;

fn setup() -> (Arc<XdsState>, Router) {
    let state = Arc::new(XdsState::new(GraphConfig::default()));
    let router = build_router(state.clone());
    (state, router)
}

fn post_routes(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/routes")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method(Method::GET).uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn post_routes_publishes_snapshot() {
    let (state, router) = setup();

    let response = router
        .oneshot(post_routes(
            r#"{"routes":[
                {"prefix":"/payments","cluster":"payments","tls":true},
                {"prefix":"/split","weighted_clusters":[
                    {"name":"payments","weight":70},
                    {"name":"payments-canary","weight":30}
                ]}
            ]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());

    let snapshot = state.current_snapshot().expect("snapshot published");
    assert_eq!(snapshot.version(), "v1");

    let store = state.store().await;
    assert_eq!(store.cluster("payments").map(|c| c.port), Some(443));
    assert!(store.route_table("local_routes").is_some());
}

#[tokio::test]
async fn malformed_json_is_rejected_without_publishing() {
    let (state, router) = setup();

    let response = router.oneshot(post_routes(r#"{"routes": [ "#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "bad_request");
    assert!(state.current_snapshot().is_none());
}

#[tokio::test]
async fn invalid_prefix_is_rejected() {
    let (state, router) = setup();

    let request = post_routes(r#"{"routes":[{"prefix":"api","cluster":"a"}]}"#);
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap_or_default().contains("prefix"));
    assert_eq!(state.resources().await.version, 0);
}

#[tokio::test]
async fn out_of_range_port_is_rejected() {
    let (_state, router) = setup();

    let response = router
        .oneshot(post_routes(r#"{"routes":[{"prefix":"/a","cluster":"a","port":70000}]}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn loose_input_is_accepted() {
    let (state, router) = setup();

    let response = router
        .oneshot(post_routes(
            r#"{"routes":[{"prefix":"/a","cluster":"a","headers":null,
                "headers_to_add":[{"Key":"x-stack","Value":"blue"}],
                "cluster_type":"bogus"}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.resources().await.clusters, vec!["a".to_string()]);
}

#[tokio::test]
async fn resources_listing_reports_names_and_version() {
    let (state, router) = setup();
    state.bootstrap().await.unwrap();

    let response = router
        .clone()
        .oneshot(post_routes(
            r#"{"routes":[{"prefix":"/b","cluster":"b"},{"prefix":"/a","cluster":"a"}]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router.oneshot(get("/api/v1/resources")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["clusters"], serde_json::json!(["a", "b"]));
    assert_eq!(body["routes"], serde_json::json!(["local_routes"]));
    assert_eq!(body["listeners"], serde_json::json!(["local_listener"]));
    assert_eq!(body["version"], 2);
}

#[tokio::test]
async fn ready_and_status_endpoints() {
    let (_state, router) = setup();

    let response = router.clone().oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");

    let response = router.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "running");
    assert_eq!(body["gRPC"], "enabled");
    assert_eq!(body["REST"], "enabled");
}

#[tokio::test]
async fn failed_publish_returns_internal_error() {
    let graph = GraphConfig { listener_port: 0, ..GraphConfig::default() };
    let state = Arc::new(XdsState::new(graph));
    let router = build_router(state.clone());

    let response =
        router.oneshot(post_routes(r#"{"routes":[{"prefix":"/a","cluster":"a"}]}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(state.store().await.cluster("a").is_none());
}
