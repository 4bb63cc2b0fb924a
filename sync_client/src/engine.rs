//! Position synchronization engine.
//!
//! Keeps one entity's position consistent between the local view and the
//! remote store:
//! - Every local move is rendered immediately and becomes the single pending
//!   update (last write wins, nothing is queued).
//! - A debounce timer delays the network call until input goes quiet, and a
//!   distance threshold drops sends that would not move the remote copy
//!   meaningfully.
//! - Failed sends are retried on a timer. Connectivity failures additionally
//!   put the engine offline until the retry fires.
//! - `force_flush` pushes the pending value through the best-effort beacon
//!   path when the host is going away.
//!
//! Timers are Tokio tasks on the runtime the engine was created on. Each timer
//! slot carries an epoch so a timer that already woke up cannot act after it
//! was cancelled or replaced.

use std::{sync::Arc, sync::Weak, time::Duration};

use anyhow::Context;
use parking_lot::Mutex;
use sync_shared::{
    config::SyncConfig,
    math::Position,
    net::{EntityId, PositionUpdate},
    render::PositionSink,
    transport::{BeaconTransport, FailureKind, PositionTransport},
};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, trace, warn};

use crate::grid::{self, Direction};

/// Sync state as seen from outside. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// Remote copy matches the last local move.
    Synced,
    /// A local move has not been confirmed by the server yet.
    PendingLocal,
    /// A normal-path request is in flight.
    Sending,
    /// The last send failed for connectivity reasons; waiting for retry.
    Offline,
}

/// Cancellable one-shot timer slot.
#[derive(Debug, Default)]
struct Timer {
    epoch: u64,
    handle: Option<JoinHandle<()>>,
}

impl Timer {
    fn cancel(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Returns true if the timer armed at `epoch` is still the current one.
    fn fire(&mut self, epoch: u64) -> bool {
        if self.epoch != epoch {
            return false;
        }
        self.handle = None;
        true
    }
}

#[derive(Debug, Default)]
struct SyncState {
    pending: Option<Position>,
    last_sent: Option<Position>,
    offline: bool,
    sending: bool,
    /// Consecutive failed sends, drives backoff.
    failures: u32,
    debounce: Timer,
    retry: Timer,
    moving: Timer,
    destroyed: bool,
}

#[derive(Clone, Copy)]
enum TimerSlot {
    Debounce,
    Retry,
    Moving,
}

impl SyncState {
    fn slot(&mut self, slot: TimerSlot) -> &mut Timer {
        match slot {
            TimerSlot::Debounce => &mut self.debounce,
            TimerSlot::Retry => &mut self.retry,
            TimerSlot::Moving => &mut self.moving,
        }
    }
}

struct Shared {
    entity: EntityId,
    cfg: SyncConfig,
    sink: Arc<dyn PositionSink>,
    transport: Arc<dyn PositionTransport>,
    beacon: Arc<dyn BeaconTransport>,
    runtime: Handle,
    state: Mutex<SyncState>,
}

/// Handle to a single entity's sync engine. Clones share the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<Shared>,
}

impl SyncEngine {
    /// Creates an engine for `entity`. Must be called inside a Tokio runtime;
    /// the engine's timers run on that runtime.
    pub fn new(
        entity: EntityId,
        cfg: SyncConfig,
        sink: Arc<dyn PositionSink>,
        transport: Arc<dyn PositionTransport>,
        beacon: Arc<dyn BeaconTransport>,
    ) -> anyhow::Result<Self> {
        let runtime = Handle::try_current().context("sync engine needs a tokio runtime")?;
        debug!(entity = %entity, "Sync engine created");
        Ok(Self {
            shared: Arc::new(Shared {
                entity,
                cfg,
                sink,
                transport,
                beacon,
                runtime,
                state: Mutex::new(SyncState::default()),
            }),
        })
    }

    pub fn entity(&self) -> &EntityId {
        &self.shared.entity
    }

    /// Applies a local move. Renders it immediately, replaces the pending
    /// update and restarts the debounce timer. Never blocks, never fails.
    pub fn submit_local_move(&self, position: Position) {
        self.shared.submit_local_move(position);
    }

    /// Moves one grid cell in `direction` from the currently displayed
    /// position. Returns the new position, or `None` if nothing moved.
    pub fn handle_discrete_step(&self, direction: Direction) -> Option<Position> {
        if self.shared.state.lock().destroyed {
            return None;
        }
        let current = self.shared.sink.current_position()?;
        let target = grid::step(&self.shared.cfg.grid, current, direction)?;
        self.submit_local_move(target);
        Some(target)
    }

    /// Cancels the debounce timer and sends the pending update, if any, over
    /// the beacon path. Delivery is initiated before this returns. Returns
    /// whether a beacon was sent.
    pub fn force_flush(&self) -> bool {
        self.shared.force_flush()
    }

    /// Cancels all timers and drops pending state without flushing. Later
    /// calls on this engine are ignored.
    pub fn destroy(&self) {
        self.shared.destroy();
    }

    /// False while offline after a connectivity failure.
    pub fn is_connected(&self) -> bool {
        !self.shared.state.lock().offline
    }

    pub fn status(&self) -> EngineStatus {
        let st = self.shared.state.lock();
        if st.offline {
            EngineStatus::Offline
        } else if st.sending {
            EngineStatus::Sending
        } else if st.pending.is_some() {
            EngineStatus::PendingLocal
        } else {
            EngineStatus::Synced
        }
    }

    /// Most recent local position not yet confirmed as sent.
    pub fn pending(&self) -> Option<Position> {
        self.shared.state.lock().pending
    }

    /// Position carried by the last successful normal-path send.
    pub fn last_sent(&self) -> Option<Position> {
        self.shared.state.lock().last_sent
    }
}

impl Shared {
    fn submit_local_move(self: &Arc<Self>, position: Position) {
        if self.state.lock().destroyed {
            debug!(entity = %self.entity, "Move ignored, engine destroyed");
            return;
        }

        // The sink is called without the state lock held so it may query us.
        self.sink.apply_position(position);

        {
            let mut st = self.state.lock();
            trace!(entity = %self.entity, %position, "Local move");
            st.pending = Some(position);
            self.arm(&mut st, TimerSlot::Moving, self.cfg.moving_flag());
            self.arm(&mut st, TimerSlot::Debounce, self.cfg.debounce());
        }
        // Raised only after the moving timer was re-armed; see `on_timer`.
        self.sink.set_moving(true);
    }

    /// (Re)starts the timer in `slot`. The previous one, if any, is cancelled.
    fn arm(self: &Arc<Self>, st: &mut SyncState, slot: TimerSlot, delay: Duration) {
        let timer = st.slot(slot);
        timer.cancel();
        let epoch = timer.epoch;
        let weak: Weak<Shared> = Arc::downgrade(self);
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.on_timer(slot, epoch);
            }
        });
        st.slot(slot).handle = Some(handle);
    }

    fn on_timer(self: &Arc<Self>, slot: TimerSlot, epoch: u64) {
        let mut st = self.state.lock();
        if st.destroyed || !st.slot(slot).fire(epoch) {
            return;
        }
        match slot {
            TimerSlot::Debounce => self.attempt_sync(&mut st),
            TimerSlot::Retry => {
                if st.offline {
                    info!(entity = %self.entity, "Retry timer elapsed, back online");
                }
                st.offline = false;
                if st.pending.is_some() {
                    self.attempt_sync(&mut st);
                }
            }
            TimerSlot::Moving => {
                drop(st);
                self.sink.set_moving(false);
                // A move that re-armed the timer while the flag was being
                // cleared must not end up looking idle.
                let st = self.state.lock();
                if !st.destroyed && st.moving.epoch != epoch {
                    drop(st);
                    self.sink.set_moving(true);
                }
            }
        }
    }

    /// Starts a normal-path send of the pending update if one is warranted.
    fn attempt_sync(self: &Arc<Self>, st: &mut SyncState) {
        let Some(pending) = st.pending else {
            return;
        };
        if st.offline {
            debug!(entity = %self.entity, "Offline, holding pending position for retry");
            return;
        }
        if st.sending {
            debug!(entity = %self.entity, "Send already in flight");
            return;
        }
        if let Some(last) = st.last_sent {
            let distance = last.distance(pending);
            if distance < self.cfg.move_threshold {
                debug!(
                    entity = %self.entity,
                    distance,
                    threshold = self.cfg.move_threshold,
                    "Move below threshold, not sending"
                );
                return;
            }
        }

        st.sending = true;
        let shared = Arc::clone(self);
        self.runtime.spawn(async move { shared.send(pending).await });
    }

    /// One normal-path attempt. `sent` is the value captured at issue time;
    /// `pending` may change while the request is in flight.
    async fn send(self: Arc<Self>, sent: Position) {
        let update = PositionUpdate::now(sent);
        info!(entity = %self.entity, position = %sent, "Syncing position");
        let result = self.transport.request_update(&self.entity, &update).await;

        let mut st = self.state.lock();
        st.sending = false;
        if st.destroyed {
            debug!(entity = %self.entity, "Send completed after destroy, ignoring");
            return;
        }

        match result {
            Ok(()) => {
                st.last_sent = Some(sent);
                st.failures = 0;
                // Any success ends recovery; a stale retry would bypass the debounce.
                st.retry.cancel();
                if st.pending == Some(sent) {
                    st.pending = None;
                    info!(entity = %self.entity, position = %sent, "Position synced");
                } else if st.pending.is_some() {
                    debug!(
                        entity = %self.entity,
                        position = %sent,
                        "Position synced, newer move arrived in flight"
                    );
                    self.arm(&mut st, TimerSlot::Debounce, self.cfg.debounce());
                }
            }
            Err(err) => {
                let kind = err.kind();
                warn!(entity = %self.entity, error = %err, ?kind, "Failed to sync position");
                if kind == FailureKind::Connectivity && !st.offline {
                    st.offline = true;
                    info!(entity = %self.entity, "Marked offline");
                }
                let delay = self.cfg.retry_delay(st.failures);
                st.failures = st.failures.saturating_add(1);
                debug!(entity = %self.entity, ?delay, "Scheduling retry");
                self.arm(&mut st, TimerSlot::Retry, delay);
            }
        }
    }

    fn force_flush(&self) -> bool {
        let pending = {
            let mut st = self.state.lock();
            if st.destroyed {
                return false;
            }
            st.debounce.cancel();
            st.pending
        };
        let Some(position) = pending else {
            debug!(entity = %self.entity, "Flush requested, nothing pending");
            return false;
        };
        info!(entity = %self.entity, %position, "Flushing pending position via beacon");
        self.beacon
            .send_beacon(&self.entity, &PositionUpdate::now(position));
        true
    }

    fn destroy(&self) {
        let mut st = self.state.lock();
        if st.destroyed {
            return;
        }
        st.destroyed = true;
        st.debounce.cancel();
        st.retry.cancel();
        st.moving.cancel();
        st.pending = None;
        st.last_sent = None;
        info!(entity = %self.entity, "Sync engine destroyed");
    }
}
