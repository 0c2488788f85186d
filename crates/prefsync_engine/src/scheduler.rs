//! Timer scheduling abstraction.
//!
//! The engine never touches a clock or a timer directly. Everything time-based
//! (debounce, retry backoff, merge throttling, `lastSynced`) goes through a
//! [`Scheduler`], so the same engine runs on real time ([`TokioScheduler`])
//! or on a virtual clock that tests advance by hand ([`ManualScheduler`]).

use crate::error::{SyncError, SyncResult};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use prefsync_protocol::Timestamp;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// Work run when a timer fires.
pub type Task = BoxFuture<'static, ()>;

/// Identifies a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Returns the raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Schedules delayed work and tells the time.
///
/// # Invariants
///
/// - A timer fires at most once, no earlier than its delay
/// - `cancel` on a fired or already-cancelled timer is a no-op
/// - A timer that has started running is not interrupted by `cancel`
pub trait Scheduler: Send + Sync + 'static {
    /// Runs `task` after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancels a scheduled timer.
    fn cancel(&self, id: TimerId);

    /// Runs `task` as soon as possible, outside the caller's stack.
    fn spawn(&self, task: Task) {
        let _ = self.schedule(Duration::ZERO, task);
    }

    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Real-time scheduler backed by tokio timers.
///
/// Each timer is a spawned task that sleeps and then runs; cancelling aborts
/// the sleeping task. Time follows `tokio::time`, so a runtime with paused
/// time drives it virtually as well.
#[derive(Clone)]
pub struct TokioScheduler {
    inner: Arc<TokioInner>,
}

struct TokioInner {
    handle: Handle,
    timers: Mutex<HashMap<TimerId, AbortHandle>>,
    next_id: AtomicU64,
    origin: tokio::time::Instant,
    origin_wall: Timestamp,
}

impl TokioScheduler {
    /// Creates a scheduler that spawns onto `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            inner: Arc::new(TokioInner {
                handle,
                timers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                origin: tokio::time::Instant::now(),
                origin_wall: Timestamp::now(),
            }),
        }
    }

    /// Creates a scheduler on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoRuntime`] outside a tokio runtime.
    pub fn current() -> SyncResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| SyncError::NoRuntime)
    }

    /// Returns the number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.lock().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let weak: Weak<TokioInner> = Arc::downgrade(&self.inner);

        // Hold the map lock until the abort handle is recorded, so the timer
        // cannot observe itself as cancelled before it was registered.
        let mut timers = self.inner.timers.lock();
        let join = self.inner.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let armed = weak
                .upgrade()
                .map(|inner| inner.timers.lock().remove(&id).is_some())
                .unwrap_or(false);
            if armed {
                task.await;
            }
        });
        timers.insert(id, join.abort_handle());
        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some(handle) = self.inner.timers.lock().remove(&id) {
            handle.abort();
        }
    }

    fn spawn(&self, task: Task) {
        self.inner.handle.spawn(task);
    }

    fn now(&self) -> Timestamp {
        self.inner
            .origin_wall
            .saturating_add(self.inner.origin.elapsed())
    }
}

/// Virtual-clock scheduler for deterministic tests.
///
/// Time only moves when [`ManualScheduler::advance`] is called; due timers
/// run in (due time, scheduling order) on the caller's task, one at a time,
/// each to completion. Timers scheduled by a running timer fire within the
/// same `advance` call if they fall due before its end.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    now: u64,
    next_id: u64,
    timers: BTreeMap<(u64, u64), Task>,
    due: HashMap<u64, u64>,
}

impl ManualScheduler {
    /// Creates a scheduler whose clock starts at the epoch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scheduler whose clock starts at `start`.
    pub fn starting_at(start: Timestamp) -> Self {
        let scheduler = Self::default();
        scheduler.state.lock().now = start.as_millis();
        scheduler
    }

    /// Moves the clock forward, running every timer that falls due.
    pub async fn advance(&self, by: Duration) {
        let target = {
            let state = self.state.lock();
            Timestamp(state.now).saturating_add(by).as_millis()
        };

        while let Some(task) = self.pop_due(target) {
            task.await;
        }

        let mut state = self.state.lock();
        state.now = state.now.max(target);
    }

    /// Runs every timer already due, without moving the clock.
    pub async fn run_until_idle(&self) {
        self.advance(Duration::ZERO).await;
    }

    /// Returns the number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Returns how long until the next timer falls due.
    pub fn next_due_in(&self) -> Option<Duration> {
        let state = self.state.lock();
        state
            .timers
            .keys()
            .next()
            .map(|(due, _)| Duration::from_millis(due.saturating_sub(state.now)))
    }

    fn pop_due(&self, target: u64) -> Option<Task> {
        let mut state = self.state.lock();
        let (due, id) = *state.timers.keys().next()?;
        if due > target {
            return None;
        }
        let task = state.timers.remove(&(due, id))?;
        state.due.remove(&id);
        state.now = state.now.max(due);
        Some(task)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let due = Timestamp(state.now).saturating_add(delay).as_millis();
        state.timers.insert((due, id), task);
        state.due.insert(id, due);
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) {
        let mut state = self.state.lock();
        if let Some(due) = state.due.remove(&id.0) {
            state.timers.remove(&(due, id.0));
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp(self.state.lock().now)
    }
}
