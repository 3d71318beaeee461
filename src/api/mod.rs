//! Administrative REST API
//!
//! - `POST /api/v1/routes` replaces the route table and publishes
//! - `GET /api/v1/resources` lists resource names and the current version
//! - `GET /ready` and `GET /` report liveness

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use routes::{build_router, ApiState};
pub use server::start_api_server;
