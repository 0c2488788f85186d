//! Remote preference service abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use prefsync_protocol::{MergeRequest, MergeResponse, PreferenceSet, UpdateRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// The remote authority for preferences.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process, mock for testing).
#[async_trait]
pub trait RemoteService: Send + Sync + 'static {
    /// Fetches the authoritative preferences.
    async fn fetch_current(&self) -> SyncResult<PreferenceSet>;

    /// Sends the full local snapshot; the remote resolves each field by
    /// timestamp and returns the result.
    async fn merge(&self, snapshot: &MergeRequest) -> SyncResult<MergeResponse>;

    /// Overwrites each included preference type.
    async fn update(&self, request: &UpdateRequest) -> SyncResult<()>;

    /// Hands an update to a transport that outlives the caller (a page
    /// unload beacon). Returns whether the transport accepted it; delivery
    /// is never confirmed.
    fn send_keepalive(&self, request: UpdateRequest) -> bool;
}

#[async_trait]
impl<R: RemoteService + ?Sized> RemoteService for Arc<R> {
    async fn fetch_current(&self) -> SyncResult<PreferenceSet> {
        (**self).fetch_current().await
    }

    async fn merge(&self, snapshot: &MergeRequest) -> SyncResult<MergeResponse> {
        (**self).merge(snapshot).await
    }

    async fn update(&self, request: &UpdateRequest) -> SyncResult<()> {
        (**self).update(request).await
    }

    fn send_keepalive(&self, request: UpdateRequest) -> bool {
        (**self).send_keepalive(request)
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Transport,
    Status(u16),
}

impl Failure {
    fn to_error(self, operation: &str) -> SyncError {
        match self {
            Failure::Transport => {
                SyncError::transport_retryable(format!("mock {operation} failure"))
            }
            Failure::Status(401) => SyncError::Unauthorized(format!("mock {operation} rejected")),
            Failure::Status(status) => SyncError::Remote {
                status,
                message: format!("mock {operation} failure"),
            },
        }
    }
}

#[derive(Default)]
struct Script {
    update_failures: Vec<Failure>,
    fail_all_updates: Option<Failure>,
    merge_failures: usize,
    fetch_failures: usize,
    merge_response: Option<MergeResponse>,
    current: PreferenceSet,
    keepalive_accepts: bool,
}

#[derive(Default)]
struct Calls {
    updates: Vec<UpdateRequest>,
    merges: Vec<MergeRequest>,
    keepalives: Vec<UpdateRequest>,
    fetches: usize,
}

/// A scripted remote for testing.
///
/// Records every call and fails on demand. Updates can be held open with
/// [`MockRemote::pause_updates`] to observe the engine while a flush is in
/// flight; [`MockRemote::pause_merges`] does the same for merges.
pub struct MockRemote {
    connected: AtomicBool,
    script: Mutex<Script>,
    calls: Mutex<Calls>,
    update_gate: Gate,
    merge_gate: Gate,
}

/// Holds calls open until permits are added. A closed gate lets every
/// waiter through.
#[derive(Default)]
struct Gate(Mutex<Option<Arc<Semaphore>>>);

impl Gate {
    fn pause(&self) {
        *self.0.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    fn release(&self, n: usize) {
        if let Some(gate) = self.0.lock().as_ref() {
            gate.add_permits(n);
        }
    }

    fn resume(&self) {
        if let Some(gate) = self.0.lock().take() {
            gate.close();
        }
    }

    async fn pass(&self) {
        let gate = self.0.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    /// Creates a mock that accepts everything.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            script: Mutex::new(Script {
                keepalive_accepts: true,
                ..Script::default()
            }),
            calls: Mutex::new(Calls::default()),
            update_gate: Gate::default(),
            merge_gate: Gate::default(),
        }
    }

    /// Sets the connected state. A disconnected mock fails every call with
    /// [`SyncError::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Fails the next `n` updates with a retryable transport error.
    pub fn fail_next_updates(&self, n: usize) {
        let mut script = self.script.lock();
        script
            .update_failures
            .extend(std::iter::repeat(Failure::Transport).take(n));
    }

    /// Fails the next `n` updates with the given status code.
    pub fn fail_next_updates_with_status(&self, n: usize, status: u16) {
        let mut script = self.script.lock();
        script
            .update_failures
            .extend(std::iter::repeat(Failure::Status(status)).take(n));
    }

    /// Fails every update with a retryable transport error until turned off.
    pub fn fail_all_updates(&self, fail: bool) {
        self.script.lock().fail_all_updates = fail.then_some(Failure::Transport);
    }

    /// Fails the next `n` merges.
    pub fn fail_next_merges(&self, n: usize) {
        self.script.lock().merge_failures += n;
    }

    /// Fails the next `n` fetches.
    pub fn fail_next_fetches(&self, n: usize) {
        self.script.lock().fetch_failures += n;
    }

    /// Sets the merge result. Without one, merges echo the request.
    pub fn set_merge_response(&self, response: MergeResponse) {
        self.script.lock().merge_response = Some(response);
    }

    /// Sets the result of `fetch_current`.
    pub fn set_current(&self, current: PreferenceSet) {
        self.script.lock().current = current;
    }

    /// Sets whether keep-alive sends are accepted.
    pub fn set_keepalive_accepts(&self, accepts: bool) {
        self.script.lock().keepalive_accepts = accepts;
    }

    /// Holds every subsequent update open until released.
    pub fn pause_updates(&self) {
        self.update_gate.pause();
    }

    /// Lets `n` held updates complete.
    pub fn release_updates(&self, n: usize) {
        self.update_gate.release(n);
    }

    /// Stops holding updates; updates already waiting are released.
    pub fn resume_updates(&self) {
        self.update_gate.resume();
    }

    /// Holds every subsequent merge open until released.
    pub fn pause_merges(&self) {
        self.merge_gate.pause();
    }

    /// Lets `n` held merges complete.
    pub fn release_merges(&self, n: usize) {
        self.merge_gate.release(n);
    }

    /// Stops holding merges; merges already waiting are released.
    pub fn resume_merges(&self) {
        self.merge_gate.resume();
    }

    /// Returns every update request received, in order.
    pub fn update_calls(&self) -> Vec<UpdateRequest> {
        self.calls.lock().updates.clone()
    }

    /// Returns the number of update requests received.
    pub fn update_count(&self) -> usize {
        self.calls.lock().updates.len()
    }

    /// Returns every merge request received, in order.
    pub fn merge_calls(&self) -> Vec<MergeRequest> {
        self.calls.lock().merges.clone()
    }

    /// Returns every keep-alive request received, in order.
    pub fn keepalive_calls(&self) -> Vec<UpdateRequest> {
        self.calls.lock().keepalives.clone()
    }

    /// Returns the number of fetches received.
    pub fn fetch_count(&self) -> usize {
        self.calls.lock().fetches
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn fetch_current(&self) -> SyncResult<PreferenceSet> {
        self.calls.lock().fetches += 1;
        self.check_connected()?;
        let mut script = self.script.lock();
        if script.fetch_failures > 0 {
            script.fetch_failures -= 1;
            return Err(Failure::Transport.to_error("fetch"));
        }
        Ok(script.current.clone())
    }

    async fn merge(&self, snapshot: &MergeRequest) -> SyncResult<MergeResponse> {
        self.calls.lock().merges.push(snapshot.clone());
        self.merge_gate.pass().await;
        self.check_connected()?;
        let mut script = self.script.lock();
        if script.merge_failures > 0 {
            script.merge_failures -= 1;
            return Err(Failure::Transport.to_error("merge"));
        }
        Ok(script
            .merge_response
            .clone()
            .unwrap_or_else(|| snapshot.clone()))
    }

    async fn update(&self, request: &UpdateRequest) -> SyncResult<()> {
        self.calls.lock().updates.push(request.clone());
        self.update_gate.pass().await;
        self.check_connected()?;
        let mut script = self.script.lock();
        if let Some(failure) = script.fail_all_updates {
            return Err(failure.to_error("update"));
        }
        if !script.update_failures.is_empty() {
            let failure = script.update_failures.remove(0);
            return Err(failure.to_error("update"));
        }
        Ok(())
    }

    fn send_keepalive(&self, request: UpdateRequest) -> bool {
        self.calls.lock().keepalives.push(request);
        self.connected.load(Ordering::SeqCst) && self.script.lock().keepalive_accepts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prefsync_protocol::{PreferenceType, Timestamp};
    use serde_json::json;

    fn favorites(item: &str) -> UpdateRequest {
        UpdateRequest::new().with(PreferenceType::Favorites, json!({ "items": [item] }))
    }

    #[tokio::test]
    async fn records_updates_and_scripted_failures() {
        let remote = MockRemote::new();
        remote.fail_next_updates(1);
        remote.fail_next_updates_with_status(1, 400);

        let first = remote.update(&favorites("a")).await.unwrap_err();
        assert!(first.is_retryable());
        let second = remote.update(&favorites("b")).await.unwrap_err();
        assert!(!second.is_retryable());
        remote.update(&favorites("c")).await.unwrap();

        assert_eq!(remote.update_count(), 3);
        assert_eq!(remote.update_calls()[2], favorites("c"));
    }

    #[tokio::test]
    async fn disconnected_mock_fails() {
        let remote = MockRemote::new();
        remote.set_connected(false);
        assert!(matches!(
            remote.fetch_current().await,
            Err(SyncError::NotConnected)
        ));
        assert!(!remote.send_keepalive(favorites("a")));
        assert_eq!(remote.keepalive_calls().len(), 1);
    }

    #[tokio::test]
    async fn merge_echoes_without_response() {
        let remote = MockRemote::new();
        let snapshot =
            PreferenceSet::new().with(PreferenceType::Theme, json!({ "mode": "dark" }), Timestamp(5));
        assert_eq!(remote.merge(&snapshot).await.unwrap(), snapshot);

        remote.fail_next_merges(1);
        assert!(remote.merge(&snapshot).await.is_err());
        assert_eq!(remote.merge_calls().len(), 2);
    }

    #[tokio::test]
    async fn paused_update_waits_for_release() {
        let remote = Arc::new(MockRemote::new());
        remote.pause_updates();

        let task = tokio::spawn({
            let remote = Arc::clone(&remote);
            async move { remote.update(&favorites("held")).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(remote.update_count(), 1);
        assert!(!task.is_finished());

        remote.release_updates(1);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn paused_merge_waits_until_resumed() {
        let remote = Arc::new(MockRemote::new());
        remote.pause_merges();
        let snapshot =
            PreferenceSet::new().with(PreferenceType::Goals, json!({ "items": [] }), Timestamp(1));

        let task = tokio::spawn({
            let remote = Arc::clone(&remote);
            let snapshot = snapshot.clone();
            async move { remote.merge(&snapshot).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(remote.merge_calls().len(), 1);
        assert!(!task.is_finished());

        remote.resume_merges();
        assert_eq!(task.await.unwrap().unwrap(), snapshot);
    }
}
