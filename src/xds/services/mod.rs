pub mod ads;
pub mod stream;

pub use ads::{start_xds_server, SnapshotAggregatedDiscoveryService};
