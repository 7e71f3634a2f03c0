//! # roomzin-client
//!
//! Rust client for the Roomzin distributed room-inventory cache.
//!
//! The cache speaks a length-prefixed binary TCP protocol; this crate
//! turns typed commands into wire frames, routes them to the right
//! cluster member, and turns wire responses back into typed results.
//!
//! ## Architecture
//!
//! - **Protocol** (`protocol`): 9-byte frame header, tag-length-value
//!   fields, value codecs (packed dates, compact property identifiers,
//!   feature bitmasks), login handshake
//! - **Cluster** (`cluster`): HTTP topology discovery with vote-based
//!   leader election, a request router with a bounded queue,
//!   latency-aware follower selection and transient-status retries
//! - **Single** (`single`): one self-healing connection for
//!   non-clustered deployments
//!
//! Writes go only to the leader; reads are load-balanced across
//! followers by rolling-average latency.
//!
//! ## Example
//!
//! ```ignore
//! use roomzin_client::{ClusterClient, ClusterConfigBuilder};
//!
//! #[tokio::main]
//! async fn main() -> roomzin_client::Result<()> {
//!     let cfg = ClusterConfigBuilder::new()
//!         .seed_hosts(["10.0.0.1", "10.0.0.2"])
//!         .api_port(9000)
//!         .tcp_port(7777)
//!         .auth_token("secret")
//!         .build()?;
//!
//!     let client = ClusterClient::connect(cfg).await?;
//!     let exists = client.prop_exist("prop-1").await?;
//!     println!("exists: {exists}");
//!     client.close();
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod command;
pub mod config;
pub mod error;
pub mod protocol;
pub mod single;
pub mod types;

mod connection;
mod demux;

pub use cluster::Client as ClusterClient;
pub use config::{ClusterConfig, ClusterConfigBuilder, SingleConfig, SingleConfigBuilder};
pub use error::{Result, RoomzinError};
pub use single::Client as SingleClient;
pub use types::{
    Codecs, DayAvailability, PropertyAvailability, RoomDay, RoomDayKey, SearchAvailRequest,
    SearchPropRequest, SegmentInfo, SetPropRequest, SetRoomPkgRequest, UpdRoomAvlRequest,
};
