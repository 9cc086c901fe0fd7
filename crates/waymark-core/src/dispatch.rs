//! Single-consumer event loop applying reducer events in arrival order.
//!
//! Engine tasks enqueue one [`SyncEvent`] per completed step. A single task
//! owns the state, folds events through [`reduce`] and publishes snapshots, so
//! two events for the same identity can never interleave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};

use crate::reducer::{reduce, ObjectivesState, SyncEvent};

const EVENT_HISTORY_CAPACITY: usize = 256;

/// State published after each applied event
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    /// Number of events applied so far
    pub applied: u64,
    pub state: ObjectivesState,
}

/// Cloneable handle used by tasks to enqueue events
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<SyncEvent>,
    sent: Arc<AtomicU64>,
}

impl Dispatcher {
    /// Enqueue an event; returns false once the loop has stopped
    pub fn dispatch(&self, event: SyncEvent) -> bool {
        tracing::debug!("dispatch {}", event.name());
        self.sent.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(event).is_err() {
            self.sent.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!("Event loop stopped; dropping event");
            return false;
        }
        true
    }

    fn sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

/// Owner of the reducer state
pub struct EventLoop {
    dispatcher: Dispatcher,
    snapshots: watch::Receiver<StateSnapshot>,
    applied_events: broadcast::Sender<SyncEvent>,
}

impl EventLoop {
    /// Start the consumer task on the current tokio runtime
    pub fn spawn() -> Self {
        Self::spawn_with_state(ObjectivesState::default())
    }

    pub fn spawn_with_state(initial: ObjectivesState) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SyncEvent>();
        let (snapshot_tx, snapshots) = watch::channel(StateSnapshot {
            applied: 0,
            state: initial,
        });
        let (applied_events, _) = broadcast::channel(EVENT_HISTORY_CAPACITY);
        let history = applied_events.clone();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let _ = history.send(event.clone());
                snapshot_tx.send_modify(|snapshot| {
                    let state = std::mem::take(&mut snapshot.state);
                    snapshot.state = reduce(state, event);
                    snapshot.applied += 1;
                });
            }
            tracing::debug!("Event loop finished");
        });

        Self {
            dispatcher: Dispatcher {
                tx,
                sent: Arc::new(AtomicU64::new(0)),
            },
            snapshots,
            applied_events,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Current state, possibly lagging behind events still queued
    pub fn state(&self) -> ObjectivesState {
        self.snapshots.borrow().state.clone()
    }

    /// Wait until every event dispatched so far has been applied
    pub async fn settled(&self) -> ObjectivesState {
        let target = self.dispatcher.sent();
        let mut snapshots = self.snapshots.clone();
        let applied = snapshots
            .wait_for(|snapshot| snapshot.applied >= target)
            .await
            .map(|snapshot| snapshot.state.clone());
        applied.unwrap_or_else(|_| self.state())
    }

    /// Follow published snapshots
    pub fn watch(&self) -> watch::Receiver<StateSnapshot> {
        self.snapshots.clone()
    }

    /// Receive every event applied from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.applied_events.subscribe()
    }
}
