//! `sync_shared`
//!
//! Shared libraries used by both the sync client and the reference server.
//!
//! Design goals:
//! - One mutable value per entity: its position. No history, no queues.
//! - Clear separation of concerns (geometry, config, wire, transport seams).
//! - Traits for the collaborators the engine talks to, so tests can inject fakes.
//! - No `unsafe`.

pub mod config;
pub mod math;
pub mod net;
pub mod render;
pub mod transport;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::{EntityId, PositionUpdate};
    pub use crate::render::*;
    pub use crate::transport::*;
}
