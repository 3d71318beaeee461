use axum::extract::rejection::JsonRejection;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::Instrument;
use validator::Validate;

use crate::xds::declaration::RoutesRequest;
use crate::xds::ResourceListing;

use super::{error::ApiError, routes::ApiState};

/// Replace the route table with the posted declarations and publish.
/// Malformed or invalid bodies are rejected before any state changes.
pub async fn apply_routes_handler(
    State(state): State<ApiState>,
    payload: Result<Json<RoutesRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(payload) = payload?;
    payload.validate()?;

    let span = crate::request_span!("POST", "/api/v1/routes", routes = payload.routes.len());
    let outcome = state.xds_state.apply(&payload.routes).instrument(span).await?;

    tracing::info!(
        version = %outcome.version,
        warnings = outcome.warnings.len(),
        "Route declarations published"
    );

    Ok(StatusCode::OK)
}

pub async fn list_resources_handler(State(state): State<ApiState>) -> Json<ResourceListing> {
    Json(state.xds_state.resources().await)
}

pub async fn ready_handler() -> &'static str {
    "OK"
}

pub async fn status_handler() -> Json<Value> {
    Json(json!({ "status": "running", "gRPC": "enabled", "REST": "enabled" }))
}
