//! Single-node deployment: self-healing handler and typed client.

pub mod client;
pub mod handler;

pub use client::Client;
pub use handler::{ReconnectCallback, SingleHandler};
