//! Clustered deployment: topology discovery, request routing, typed
//! client.

pub mod client;
pub mod handler;
pub mod topology;

pub use client::Client;
pub use handler::{ClusterHandler, TopologyCallback};
pub use topology::{ClusterTopology, NodeHealth, NodeInfo};
