//! `sync_server`
//!
//! Server-side systems:
//! - Position store keyed by entity (last arrival wins)
//! - TCP request/ack loop for the normal path
//! - UDP intake for best-effort beacons
//!
//! Both paths write the same absolute value, so duplicate or reordered
//! deliveries of one position converge to the same record.

pub mod server;
pub mod store;

pub use server::PositionServer;
pub use store::PositionStore;
