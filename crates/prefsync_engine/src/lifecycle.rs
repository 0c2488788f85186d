//! Host lifecycle and connectivity signals.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A host signal the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The page or window was hidden.
    VisibilityHidden,
    /// The page is being torn down.
    Unload,
    /// Connectivity was regained.
    Online,
    /// Connectivity was lost.
    Offline,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleEvent::VisibilityHidden => "visibility-hidden",
            LifecycleEvent::Unload => "unload",
            LifecycleEvent::Online => "online",
            LifecycleEvent::Offline => "offline",
        })
    }
}

/// Identifies a registered lifecycle listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A lifecycle listener.
pub type LifecycleHandler = Arc<dyn Fn() + Send + Sync>;

/// Source of host lifecycle signals.
pub trait LifecycleSource: Send + Sync {
    /// Registers a handler for one event.
    fn add_listener(&self, event: LifecycleEvent, handler: LifecycleHandler) -> ListenerId;

    /// Removes a handler. Unknown ids are ignored.
    fn remove_listener(&self, id: ListenerId);
}

/// In-process lifecycle source; hosts and tests call [`LifecycleBus::emit`].
#[derive(Default)]
pub struct LifecycleBus {
    listeners: Mutex<Vec<(ListenerId, LifecycleEvent, LifecycleHandler)>>,
    next_id: AtomicU64,
}

impl LifecycleBus {
    /// Creates a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls every handler registered for `event`, in registration order.
    pub fn emit(&self, event: LifecycleEvent) {
        let handlers: Vec<LifecycleHandler> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, e, _)| *e == event)
            .map(|(_, _, h)| Arc::clone(h))
            .collect();
        tracing::debug!(%event, handlers = handlers.len(), "lifecycle event");
        for handler in handlers {
            handler();
        }
    }

    /// Returns the number of registered handlers.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl LifecycleSource for LifecycleBus {
    fn add_listener(&self, event: LifecycleEvent, handler: LifecycleHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, event, handler));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(lid, _, _)| *lid != id);
    }
}

/// Every listener one engine registered on a source.
#[must_use = "dropping the binding leaves the listeners registered; call teardown()"]
pub struct LifecycleBinding {
    source: Arc<dyn LifecycleSource>,
    ids: Vec<ListenerId>,
}

impl LifecycleBinding {
    pub(crate) fn new(source: Arc<dyn LifecycleSource>, ids: Vec<ListenerId>) -> Self {
        Self { source, ids }
    }

    /// Removes every listener.
    pub fn teardown(self) {
        for id in self.ids {
            self.source.remove_listener(id);
        }
    }
}

impl fmt::Debug for LifecycleBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleBinding")
            .field("listeners", &self.ids.len())
            .finish()
    }
}
