//! Rendering abstraction.
//!
//! This crate intentionally does not depend on a graphics backend. The sync
//! engine only needs somewhere to put the position so the entity moves on
//! screen immediately.

use parking_lot::Mutex;

use crate::math::Position;

/// Local view of the entity. Written synchronously on every local move.
pub trait PositionSink: Send + Sync {
    fn apply_position(&self, position: Position);
    fn set_moving(&self, moving: bool);
    /// Currently displayed position, if the entity is on screen.
    fn current_position(&self) -> Option<Position>;
}

/// A sink that remembers the last applied state. Useful for headless runs.
#[derive(Debug, Default)]
pub struct NullSink {
    state: Mutex<(Option<Position>, bool)>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with the entity already displayed at `position`.
    pub fn at(position: Position) -> Self {
        Self {
            state: Mutex::new((Some(position), false)),
        }
    }

    pub fn is_moving(&self) -> bool {
        self.state.lock().1
    }
}

impl PositionSink for NullSink {
    fn apply_position(&self, position: Position) {
        self.state.lock().0 = Some(position);
    }

    fn set_moving(&self, moving: bool) {
        self.state.lock().1 = moving;
    }

    fn current_position(&self) -> Option<Position> {
        self.state.lock().0
    }
}
