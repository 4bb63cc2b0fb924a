//! Page lifecycle wiring.
//!
//! The host forwards visibility and unload notifications as
//! [`LifecycleSignal`]s. Hiding flushes; unloading flushes and then destroys
//! the engine, since nothing will be around to observe a normal send.

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use crate::engine::SyncEngine;

/// Host lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// The view became hidden (tab switched, app backgrounded).
    Hidden,
    /// The view became visible again.
    Visible,
    /// The view is about to be discarded.
    Unload,
}

/// Applies one signal to `engine`. Returns false once the engine is gone.
pub fn handle_signal(engine: &SyncEngine, signal: LifecycleSignal) -> bool {
    match signal {
        LifecycleSignal::Hidden => {
            debug!(entity = %engine.entity(), "View hidden, flushing");
            engine.force_flush();
            true
        }
        LifecycleSignal::Visible => {
            debug!(entity = %engine.entity(), "View visible");
            true
        }
        LifecycleSignal::Unload => {
            info!(entity = %engine.entity(), "View unloading, flushing and destroying");
            engine.force_flush();
            engine.destroy();
            false
        }
    }
}

/// Spawns a task feeding `signals` into `engine` until unload or until the
/// sender side is dropped. A dropped sender does not flush.
pub fn spawn_lifecycle_watcher(
    engine: SyncEngine,
    mut signals: mpsc::Receiver<LifecycleSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            if !handle_signal(&engine, signal) {
                return;
            }
        }
        debug!(entity = %engine.entity(), "Lifecycle channel closed");
    })
}
