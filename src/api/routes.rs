use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::xds::XdsState;

use super::handlers::{
    apply_routes_handler, list_resources_handler, ready_handler, status_handler,
};

#[derive(Clone)]
pub struct ApiState {
    pub xds_state: Arc<XdsState>,
}

pub fn build_router(state: Arc<XdsState>) -> Router {
    let api_state = ApiState { xds_state: state };

    Router::new()
        .route("/api/v1/routes", post(apply_routes_handler))
        .route("/api/v1/resources", get(list_resources_handler))
        .route("/ready", get(ready_handler))
        .route("/", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(api_state)
}
