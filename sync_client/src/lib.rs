//! `sync_client`
//!
//! Client-side systems:
//! - Synchronization engine (intake, debounce, send, retry, flush)
//! - Grid-stepped keyboard movement
//! - TCP request transport and UDP beacon transport
//! - Page lifecycle wiring (hidden/unload -> flush)

pub mod engine;
pub mod grid;
pub mod lifecycle;
pub mod transport;

pub use engine::{EngineStatus, SyncEngine};
