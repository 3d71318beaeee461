//! Envoy xDS resource graph and discovery server
//!
//! Declarations compile into typed model values, which the store holds by
//! name. Each publish encodes the store into an immutable [`Snapshot`] and
//! swaps it into the cache that the ADS service reads from.

pub mod cluster;
pub mod declaration;
pub mod listener;
pub mod model;
pub mod resources;
pub mod route;
pub mod services;
pub mod snapshot;
pub mod state;
pub mod store;

pub use services::start_xds_server;
pub use snapshot::{Snapshot, SnapshotCache, SnapshotPublisher};
pub use state::{ApplyOutcome, ResourceListing, XdsState};
pub use store::ConfigStore;
