//! State publisher: an ordered observer list with isolated dispatch.

use crate::state::SyncState;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A state listener.
pub type Listener = Arc<dyn Fn(&SyncState) + Send + Sync>;

/// Delivers state snapshots to subscribers.
///
/// Listeners are called synchronously, in registration order. A panicking
/// listener is caught and logged; the remaining listeners still run.
#[derive(Default)]
pub struct StatePublisher {
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl StatePublisher {
    /// Creates a publisher with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn subscribe(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        Subscription {
            id,
            publisher: Arc::downgrade(self),
        }
    }

    /// Delivers `state` to every current listener.
    pub fn publish(&self, state: &SyncState) {
        // Listeners may subscribe or unsubscribe while being notified.
        let listeners: Vec<(u64, Listener)> = self.listeners.lock().clone();
        for (id, listener) in listeners {
            Self::deliver(id, &listener, state);
        }
    }

    /// Delivers `state` to one listener with panic isolation.
    pub(crate) fn deliver(id: u64, listener: &Listener, state: &SyncState) {
        if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
            tracing::warn!(listener = id, "state listener panicked");
        }
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }
}

/// Handle returned by `subscribe`; call [`Subscription::unsubscribe`] to stop
/// receiving state.
///
/// Dropping the handle does not unsubscribe.
pub struct Subscription {
    id: u64,
    publisher: Weak<StatePublisher>,
}

impl Subscription {
    /// Returns the listener id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the listener. Safe to call after the engine is gone.
    pub fn unsubscribe(self) {
        if let Some(publisher) = self.publisher.upgrade() {
            publisher.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
