//! The preference sync engine.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::lifecycle::{LifecycleBinding, LifecycleEvent, LifecycleHandler, LifecycleSource};
use crate::publisher::{Listener, StatePublisher, Subscription};
use crate::queue::{Batch, PendingQueue};
use crate::remote::RemoteService;
use crate::scheduler::{Scheduler, Task, TimerId};
use crate::state::{SyncState, SyncStatus};
use futures::FutureExt;
use parking_lot::{Mutex, ReentrantMutex};
use prefsync_protocol::{
    LocalSnapshot, MergeResponse, Preference, PreferenceSet, PreferenceType, Timestamp,
};
use prefsync_store::PreferenceStore;
use serde_json::Value;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// What started a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    Debounce(PreferenceType),
    Retry,
    Explicit,
    Hidden,
    Online,
}

/// Clears an in-flight flag when dropped.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A scheduled timer, tagged with the arming that created it.
#[derive(Debug, Clone, Copy)]
struct ArmedTimer {
    id: TimerId,
    serial: u64,
}

struct Shared {
    queue: PendingQueue,
    state: SyncState,
    debounce_timers: HashMap<PreferenceType, ArmedTimer>,
    retry_timer: Option<ArmedTimer>,
    /// Source of `ArmedTimer::serial`.
    timer_serial: u64,
    retry_count: u32,
    last_merge_at: Option<Timestamp>,
    online: bool,
    /// Bumped by `reset`; results of operations started under an older
    /// generation are dropped.
    generation: u64,
}

impl Shared {
    fn new() -> Self {
        Self {
            queue: PendingQueue::new(),
            state: SyncState::default(),
            debounce_timers: HashMap::new(),
            retry_timer: None,
            timer_serial: 0,
            retry_count: 0,
            last_merge_at: None,
            online: true,
            generation: 0,
        }
    }

    fn next_timer_serial(&mut self) -> u64 {
        self.timer_serial += 1;
        self.timer_serial
    }

    /// Offline wins over any outcome status.
    fn settle(&mut self, status: SyncStatus) {
        self.state.status = if self.online {
            status
        } else {
            SyncStatus::Offline
        };
    }
}

#[derive(Default)]
struct NotifyState {
    publishing: Cell<bool>,
    dirty: Cell<bool>,
}

struct Inner<R, S> {
    config: SyncConfig,
    remote: R,
    scheduler: S,
    store: Option<Arc<dyn PreferenceStore>>,
    shared: Mutex<Shared>,
    publisher: Arc<StatePublisher>,
    flushing: AtomicBool,
    merging: AtomicBool,
    notify_lock: ReentrantMutex<NotifyState>,
}

/// Keeps user preferences consistent between the local store and the remote
/// authority.
///
/// Writes are queued per preference type, coalesced by a per-type debounce
/// timer and sent as one combined update. Failed flushes are retried on a
/// fixed backoff schedule; `merge` reconciles the full local snapshot with
/// the remote at login. Status changes are published to subscribers.
///
/// Network failures never surface as errors from these methods: they are
/// reported through [`SyncState`].
///
/// Cloning is cheap; clones share one engine.
pub struct PreferenceSync<R: RemoteService, S: Scheduler> {
    inner: Arc<Inner<R, S>>,
}

impl<R: RemoteService, S: Scheduler> Clone for PreferenceSync<R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RemoteService, S: Scheduler> PreferenceSync<R, S> {
    /// Creates an engine without local persistence.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::InvalidConfig`] if the configuration
    /// does not validate.
    pub fn new(config: SyncConfig, remote: R, scheduler: S) -> SyncResult<Self> {
        Self::build(config, remote, scheduler, None)
    }

    /// Creates an engine that records writes and merge results in `store`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::InvalidConfig`] if the configuration
    /// does not validate.
    pub fn with_store(
        config: SyncConfig,
        remote: R,
        scheduler: S,
        store: Arc<dyn PreferenceStore>,
    ) -> SyncResult<Self> {
        Self::build(config, remote, scheduler, Some(store))
    }

    fn build(
        config: SyncConfig,
        remote: R,
        scheduler: S,
        store: Option<Arc<dyn PreferenceStore>>,
    ) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                remote,
                scheduler,
                store,
                shared: Mutex::new(Shared::new()),
                publisher: Arc::new(StatePublisher::new()),
                flushing: AtomicBool::new(false),
                merging: AtomicBool::new(false),
                notify_lock: ReentrantMutex::new(NotifyState::default()),
            }),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Returns the remote service.
    pub fn remote(&self) -> &R {
        &self.inner.remote
    }

    /// Returns the scheduler.
    pub fn scheduler(&self) -> &S {
        &self.inner.scheduler
    }

    /// Returns the attached local store.
    pub fn store(&self) -> Option<&Arc<dyn PreferenceStore>> {
        self.inner.store.as_ref()
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> SyncState {
        self.inner.shared.lock().state.clone()
    }

    /// Returns the number of distinct types waiting to be sent.
    pub fn pending_count(&self) -> usize {
        self.inner.shared.lock().queue.len()
    }

    /// Returns the queued payload for a type.
    pub fn pending(&self, pref_type: PreferenceType) -> Option<Value> {
        self.inner
            .shared
            .lock()
            .queue
            .get(pref_type)
            .map(|change| change.payload.clone())
    }

    /// Returns true unless connectivity was reported lost.
    pub fn is_online(&self) -> bool {
        self.inner.shared.lock().online
    }

    /// Queues the full current value of a type and restarts its debounce
    /// timer. Replaces any value of the same type still waiting.
    pub fn update(&self, pref_type: PreferenceType, payload: Value) {
        self.inner.update(pref_type, payload);
    }

    /// Queues a typed preference.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::Protocol`] if the payload cannot be
    /// serialized.
    pub fn update_preference(&self, preference: &Preference) -> SyncResult<()> {
        let payload = preference.to_value()?;
        self.inner.update(preference.pref_type(), payload);
        Ok(())
    }

    /// Cancels every debounce timer and sends whatever is queued now.
    ///
    /// A no-op when the queue is empty, the engine is offline, or a flush
    /// is already in flight.
    pub async fn flush(&self) {
        self.inner.flush(FlushTrigger::Explicit).await;
    }

    /// Reconciles the full local snapshot with the remote.
    ///
    /// Returns the adjudicated preferences, or `None` if the call was
    /// throttled, another merge or pull is running, or the merge failed.
    pub async fn merge(&self, snapshot: LocalSnapshot) -> Option<MergeResponse> {
        self.inner.merge(snapshot).await
    }

    /// Merges the attached store's snapshot; an engine without a store
    /// merges an empty snapshot.
    pub async fn merge_local(&self) -> Option<MergeResponse> {
        let snapshot = self
            .inner
            .store
            .as_ref()
            .map(|store| store.snapshot())
            .unwrap_or_default();
        self.inner.merge(snapshot).await
    }

    /// Fetches the authoritative preferences and writes them to the store.
    ///
    /// Not throttled; returns `None` while a merge or pull is running or on
    /// failure.
    pub async fn pull(&self) -> Option<PreferenceSet> {
        self.inner.pull().await
    }

    /// Cancels every timer, drops queued changes and returns the state to
    /// idle. Operations in flight finish but their results are discarded.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Reports a connectivity change.
    pub fn set_online(&self, online: bool) {
        self.inner.set_online(online);
    }

    /// Sends the queue on the keep-alive transport, without waiting.
    pub fn flush_keepalive(&self) {
        self.inner.flush_keepalive();
    }

    /// Registers a state listener. It is called immediately with the
    /// current state, then on every change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncState) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let _serial = self.inner.notify_lock.lock();
        let subscription = self.inner.publisher.subscribe(Arc::clone(&listener));
        StatePublisher::deliver(subscription.id(), &listener, &self.state());
        subscription
    }

    /// Returns the number of registered state listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.publisher.listener_count()
    }

    /// Hooks the engine to host lifecycle signals:
    ///
    /// - hidden: flush
    /// - unload: keep-alive flush
    /// - online / offline: resume / suspend flushing
    pub fn bind_lifecycle(&self, source: Arc<dyn LifecycleSource>) -> LifecycleBinding {
        let weak = Arc::downgrade(&self.inner);
        let hooks: [(LifecycleEvent, fn(&Arc<Inner<R, S>>)); 4] = [
            (LifecycleEvent::VisibilityHidden, |inner| {
                inner.spawn_flush(FlushTrigger::Hidden)
            }),
            (LifecycleEvent::Unload, |inner| inner.flush_keepalive()),
            (LifecycleEvent::Online, |inner| inner.set_online(true)),
            (LifecycleEvent::Offline, |inner| inner.set_online(false)),
        ];

        let ids = hooks
            .into_iter()
            .map(|(event, hook)| {
                let weak: Weak<Inner<R, S>> = weak.clone();
                let handler: LifecycleHandler = Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        hook(&inner);
                    }
                });
                source.add_listener(event, handler)
            })
            .collect();
        LifecycleBinding::new(source, ids)
    }
}

impl<R: RemoteService, S: Scheduler> Inner<R, S> {
    fn update(self: &Arc<Self>, pref_type: PreferenceType, payload: Value) {
        let now = self.scheduler.now();
        if let Some(store) = &self.store {
            if let Err(err) = store.save(pref_type, payload.clone(), now) {
                warn!(%pref_type, error = %err, "failed to persist preference locally");
            }
        }

        let pending = {
            let mut shared = self.shared.lock();
            shared.queue.enqueue(pref_type, payload, now);
            self.arm_debounce(&mut shared, pref_type);
            shared.state.pending_count = shared.queue.len();
            shared.state.pending_count
        };
        debug!(%pref_type, pending, "preference queued");
        self.notify();
    }

    /// (Re)starts the debounce timer of one type.
    fn arm_debounce(self: &Arc<Self>, shared: &mut Shared, pref_type: PreferenceType) {
        if let Some(timer) = shared.debounce_timers.remove(&pref_type) {
            self.scheduler.cancel(timer.id);
        }
        let delay = self.config.debounce_for(pref_type);
        let serial = shared.next_timer_serial();
        let weak = Arc::downgrade(self);
        let task: Task = async move {
            if let Some(inner) = weak.upgrade() {
                inner.on_debounce_fire(pref_type, serial).await;
            }
        }
        .boxed();
        let id = self.scheduler.schedule(delay, task);
        shared
            .debounce_timers
            .insert(pref_type, ArmedTimer { id, serial });
        debug!(%pref_type, delay_ms = delay.as_millis() as u64, "debounce armed");
    }

    /// Arms a debounce timer for every queued type that has none.
    fn arm_unarmed_types(self: &Arc<Self>, shared: &mut Shared) {
        let unarmed: Vec<PreferenceType> = shared
            .queue
            .types()
            .filter(|t| !shared.debounce_timers.contains_key(t))
            .collect();
        for pref_type in unarmed {
            self.arm_debounce(shared, pref_type);
        }
    }

    fn cancel_debounce_timers(&self, shared: &mut Shared) {
        for (_, timer) in shared.debounce_timers.drain() {
            self.scheduler.cancel(timer.id);
        }
    }

    fn cancel_retry_timer(&self, shared: &mut Shared) {
        if let Some(timer) = shared.retry_timer.take() {
            self.scheduler.cancel(timer.id);
        }
    }

    async fn on_debounce_fire(self: &Arc<Self>, pref_type: PreferenceType, serial: u64) {
        {
            // A newer arming may have replaced this timer after it started.
            let mut shared = self.shared.lock();
            if shared
                .debounce_timers
                .get(&pref_type)
                .is_some_and(|timer| timer.serial == serial)
            {
                shared.debounce_timers.remove(&pref_type);
            }
        }
        self.run_flush(FlushTrigger::Debounce(pref_type)).await;
    }

    async fn on_retry_fire(self: &Arc<Self>, serial: u64) {
        {
            let mut shared = self.shared.lock();
            if shared
                .retry_timer
                .is_some_and(|timer| timer.serial == serial)
            {
                shared.retry_timer = None;
            }
        }
        self.run_flush(FlushTrigger::Retry).await;
    }

    async fn flush(self: &Arc<Self>, trigger: FlushTrigger) {
        {
            let mut shared = self.shared.lock();
            self.cancel_debounce_timers(&mut shared);
        }
        self.run_flush(trigger).await;
    }

    fn spawn_flush(self: &Arc<Self>, trigger: FlushTrigger) {
        let weak = Arc::downgrade(self);
        self.scheduler.spawn(
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.flush(trigger).await;
                }
            }
            .boxed(),
        );
    }

    async fn run_flush(self: &Arc<Self>, trigger: FlushTrigger) {
        let Some(_flushing) = FlagGuard::acquire(&self.flushing) else {
            debug!(?trigger, "flush already in flight");
            return;
        };

        let (batch, generation) = {
            let mut shared = self.shared.lock();
            if shared.queue.is_empty() || !shared.online {
                return;
            }
            self.cancel_debounce_timers(&mut shared);
            let batch = shared.queue.take_batch();
            shared.state.status = SyncStatus::Syncing;
            shared.state.pending_count = 0;
            (batch, shared.generation)
        };
        debug!(?trigger, types = batch.len(), "flushing preferences");
        self.notify();

        match self.remote.update(&batch.to_request()).await {
            Ok(()) => self.on_flush_success(&batch, generation),
            Err(err) => self.on_flush_failure(batch, generation, &err),
        }
    }

    fn on_flush_success(self: &Arc<Self>, batch: &Batch, generation: u64) {
        let pending = {
            let mut shared = self.shared.lock();
            if shared.generation != generation {
                debug!("discarding flush result from before reset");
                self.arm_unarmed_types(&mut shared);
                return;
            }
            shared.retry_count = 0;
            self.cancel_retry_timer(&mut shared);
            shared.settle(SyncStatus::Synced);
            shared.state.last_synced = Some(self.scheduler.now());
            shared.state.error = None;
            shared.state.pending_count = shared.queue.len();
            self.arm_unarmed_types(&mut shared);
            shared.state.pending_count
        };
        info!(types = batch.len(), pending, "flush succeeded");
        self.notify();
    }

    fn on_flush_failure(
        self: &Arc<Self>,
        batch: Batch,
        generation: u64,
        err: &crate::error::SyncError,
    ) {
        {
            let mut shared = self.shared.lock();
            if shared.generation != generation {
                debug!("discarding flush failure from before reset");
                self.arm_unarmed_types(&mut shared);
                return;
            }
            let restored = shared.queue.restore(batch);
            shared.state.pending_count = shared.queue.len();
            shared.state.error = Some(err.to_string());
            let pending = shared.state.pending_count;

            if !shared.online {
                shared.state.status = SyncStatus::Offline;
                warn!(error = %err, restored, pending, "flush failed while offline");
            } else {
                shared.state.status = SyncStatus::Error;
                let retries = self.config.retry.max_retries;
                if shared.retry_count < retries {
                    let delay = self.config.retry.delay_for_retry(shared.retry_count);
                    self.cancel_retry_timer(&mut shared);
                    let serial = shared.next_timer_serial();
                    let weak = Arc::downgrade(self);
                    let task: Task = async move {
                        if let Some(inner) = weak.upgrade() {
                            inner.on_retry_fire(serial).await;
                        }
                    }
                    .boxed();
                    let id = self.scheduler.schedule(delay, task);
                    shared.retry_timer = Some(ArmedTimer { id, serial });
                    shared.retry_count += 1;
                    warn!(
                        error = %err,
                        retryable = err.is_retryable(),
                        attempt = shared.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "flush failed; retry scheduled"
                    );
                } else {
                    warn!(error = %err, max_retries = retries, pending, "flush retries exhausted");
                }
            }
        }
        self.notify();
    }

    fn flush_keepalive(&self) {
        let batch = {
            let mut shared = self.shared.lock();
            self.cancel_debounce_timers(&mut shared);
            if shared.queue.is_empty()
                || !shared.online
                || self.flushing.load(Ordering::Acquire)
            {
                return;
            }
            let batch = shared.queue.take_batch();
            shared.state.pending_count = 0;
            batch
        };

        if self.remote.send_keepalive(batch.to_request()) {
            // Nothing is left for a pending retry to send.
            let mut shared = self.shared.lock();
            self.cancel_retry_timer(&mut shared);
            shared.retry_count = 0;
            shared.state.error = None;
            if shared.state.status == SyncStatus::Error {
                shared.settle(SyncStatus::Idle);
            }
            info!(types = batch.len(), "keep-alive flush sent");
        } else {
            let mut shared = self.shared.lock();
            shared.queue.restore(batch);
            shared.state.pending_count = shared.queue.len();
            warn!(pending = shared.state.pending_count, "keep-alive flush rejected");
        }
        self.notify();
    }

    async fn merge(&self, snapshot: LocalSnapshot) -> Option<MergeResponse> {
        let Some(_merging) = FlagGuard::acquire(&self.merging) else {
            debug!("merge already in flight");
            return None;
        };

        let generation = {
            let mut shared = self.shared.lock();
            let now = self.scheduler.now();
            if let Some(last) = shared.last_merge_at {
                if now.saturating_since(last) < self.config.merge_interval {
                    debug!("merge throttled");
                    return None;
                }
            }
            shared.last_merge_at = Some(now);
            shared.state.status = SyncStatus::Syncing;
            shared.generation
        };
        self.notify();

        let result = self.remote.merge(&snapshot).await;
        self.finish_remote_read("merge", generation, result)
    }

    async fn pull(&self) -> Option<PreferenceSet> {
        let Some(_merging) = FlagGuard::acquire(&self.merging) else {
            debug!("pull skipped; merge in flight");
            return None;
        };

        let generation = {
            let mut shared = self.shared.lock();
            shared.state.status = SyncStatus::Syncing;
            shared.generation
        };
        self.notify();

        let result = self.remote.fetch_current().await;
        self.finish_remote_read("pull", generation, result)
    }

    /// Applies the outcome of a merge or pull.
    fn finish_remote_read(
        &self,
        operation: &'static str,
        generation: u64,
        result: SyncResult<PreferenceSet>,
    ) -> Option<PreferenceSet> {
        if self.shared.lock().generation != generation {
            debug!(operation, "discarding result from before reset");
            return None;
        }

        match result {
            Ok(preferences) => {
                self.apply_to_store(&preferences);
                {
                    let mut shared = self.shared.lock();
                    shared.settle(SyncStatus::Synced);
                    shared.state.last_synced = Some(self.scheduler.now());
                    shared.state.error = None;
                }
                info!(operation, types = preferences.len(), "remote read succeeded");
                self.notify();
                Some(preferences)
            }
            Err(err) => {
                {
                    let mut shared = self.shared.lock();
                    shared.settle(SyncStatus::Error);
                    shared.state.error = Some(err.to_string());
                }
                warn!(operation, error = %err, "remote read failed");
                self.notify();
                None
            }
        }
    }

    fn apply_to_store(&self, preferences: &PreferenceSet) {
        let Some(store) = &self.store else {
            return;
        };
        for (pref_type, entry) in preferences.iter() {
            if let Err(err) = store.save(pref_type, entry.value.clone(), entry.modified_at) {
                warn!(%pref_type, error = %err, "failed to store merged preference");
            }
        }
    }

    fn reset(&self) {
        {
            let mut shared = self.shared.lock();
            self.cancel_debounce_timers(&mut shared);
            self.cancel_retry_timer(&mut shared);
            shared.queue.clear();
            shared.retry_count = 0;
            shared.last_merge_at = None;
            shared.generation += 1;
            shared.state = SyncState::default();
            shared.settle(SyncStatus::Idle);
        }
        info!("sync engine reset");
        self.notify();
    }

    fn set_online(self: &Arc<Self>, online: bool) {
        let resumed = {
            let mut shared = self.shared.lock();
            let was_offline = !shared.online;
            shared.online = online;
            if online {
                if was_offline {
                    shared.state.status = SyncStatus::Idle;
                }
                was_offline
            } else {
                shared.state.status = SyncStatus::Offline;
                false
            }
        };
        info!(online, "connectivity changed");
        self.notify();
        if resumed {
            self.spawn_flush(FlushTrigger::Online);
        }
    }

    /// Publishes the current state. Calls made by listeners while a
    /// publication is running on this thread coalesce into one more round.
    fn notify(&self) {
        let serial = self.notify_lock.lock();
        if serial.publishing.get() {
            serial.dirty.set(true);
            return;
        }
        serial.publishing.set(true);
        loop {
            serial.dirty.set(false);
            let state = self.shared.lock().state.clone();
            self.publisher.publish(&state);
            if !serial.dirty.get() {
                break;
            }
        }
        serial.publishing.set(false);
    }
}
