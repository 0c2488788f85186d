//! Test fixtures and engine helpers.
//!
//! Provides ready-wired engines on a virtual clock, either against a
//! scripted [`MockRemote`] or against an in-process [`PreferenceServer`]
//! reached through the HTTP remote.

use parking_lot::Mutex;
use prefsync_engine::{
    HttpRemote, LoopbackClient, LoopbackServer, ManualScheduler, MockRemote, PreferenceSync,
    RemoteService, Scheduler, Subscription, SyncConfig, SyncState, SyncStatus,
};
use prefsync_protocol::{HttpRequest, HttpResponse, PreferenceType, Timestamp};
use prefsync_server::{PreferenceServer, ServerConfig};
use prefsync_store::{FileStore, MemoryStore};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Virtual clock start for test clients.
pub const CLIENT_EPOCH: Timestamp = Timestamp(1_700_000_000_000);

/// Base URL the test clients are configured with.
pub const TEST_BASE_URL: &str = "https://prefs.test";

/// Routes loopback requests to a shared server.
pub struct ServerHandler(pub Arc<PreferenceServer>);

impl LoopbackServer for ServerHandler {
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        self.0.handle_http(request)
    }
}

/// HTTP remote wired to an in-process server.
pub type LoopbackRemote = HttpRemote<LoopbackClient<ServerHandler>>;

/// Engine used by [`TestStack`].
pub type StackEngine = PreferenceSync<LoopbackRemote, ManualScheduler>;

/// Engine used by [`MockStack`].
pub type MockEngine = PreferenceSync<Arc<MockRemote>, ManualScheduler>;

/// A full client/server stack on a virtual clock.
pub struct TestStack {
    /// The reference server.
    pub server: Arc<PreferenceServer>,
    /// The client's local store.
    pub store: Arc<MemoryStore>,
    /// The client's virtual clock.
    pub scheduler: ManualScheduler,
    /// The engine under test.
    pub engine: StackEngine,
    identity: String,
}

impl TestStack {
    /// Creates a stack with default configurations.
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    /// Creates a stack with a custom engine configuration.
    pub fn with_config(config: SyncConfig) -> Self {
        Self::build(config, ServerConfig::default(), "reader")
    }

    /// Creates a stack with a custom server configuration; with auth
    /// enabled the client gets a signed token.
    pub fn with_server_config(server_config: ServerConfig) -> Self {
        Self::build(SyncConfig::default(), server_config, "reader")
    }

    fn build(config: SyncConfig, server_config: ServerConfig, identity: &str) -> Self {
        let server = Arc::new(PreferenceServer::new(server_config.clone()));
        let token = if server_config.require_auth {
            server
                .issue_token(identity)
                .expect("Failed to issue test token")
        } else {
            identity.to_string()
        };

        let client = LoopbackClient::new(ServerHandler(Arc::clone(&server)));
        let remote = HttpRemote::new(TEST_BASE_URL, client).with_token(token);
        let store = Arc::new(MemoryStore::new());
        let scheduler = ManualScheduler::starting_at(CLIENT_EPOCH);
        let engine =
            PreferenceSync::with_store(config, remote, scheduler.clone(), store.clone())
                .expect("Failed to build engine");

        Self {
            server,
            store,
            scheduler,
            engine,
            identity: identity.to_string(),
        }
    }

    /// Returns the identity the client acts for.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Advances the client clock.
    pub async fn advance(&self, by: Duration) {
        self.scheduler.advance(by).await;
    }

    /// Simulates losing or regaining the network path to the server.
    pub fn set_reachable(&self, reachable: bool) {
        self.engine.remote().client().set_reachable(reachable);
    }

    /// Returns the server's value for a type.
    pub fn server_value(&self, pref_type: PreferenceType) -> Option<Value> {
        self.server
            .fetch_current(&self.identity)
            .get(pref_type)
            .map(|entry| entry.value.clone())
    }
}

impl Default for TestStack {
    fn default() -> Self {
        Self::new()
    }
}

/// An engine against a scripted remote on a virtual clock.
pub struct MockStack {
    /// The scripted remote.
    pub remote: Arc<MockRemote>,
    /// The virtual clock.
    pub scheduler: ManualScheduler,
    /// The engine under test.
    pub engine: MockEngine,
}

impl MockStack {
    /// Creates a stack with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    /// Creates a stack with a custom configuration.
    pub fn with_config(config: SyncConfig) -> Self {
        let remote = Arc::new(MockRemote::new());
        let scheduler = ManualScheduler::starting_at(CLIENT_EPOCH);
        let engine = PreferenceSync::new(config, Arc::clone(&remote), scheduler.clone())
            .expect("Failed to build engine");
        Self {
            remote,
            scheduler,
            engine,
        }
    }

    /// Advances the clock.
    pub async fn advance(&self, by: Duration) {
        self.scheduler.advance(by).await;
    }
}

impl Default for MockStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Records every state an engine publishes.
pub struct StateRecorder {
    states: Arc<Mutex<Vec<SyncState>>>,
    subscription: Subscription,
}

impl StateRecorder {
    /// Subscribes to an engine. The first recorded state is the one
    /// current at subscription time.
    pub fn attach<R: RemoteService, S: Scheduler>(engine: &PreferenceSync<R, S>) -> Self {
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        let subscription = engine.subscribe(move |state| sink.lock().push(state.clone()));
        Self {
            states,
            subscription,
        }
    }

    /// Returns every recorded state.
    pub fn states(&self) -> Vec<SyncState> {
        self.states.lock().clone()
    }

    /// Returns the recorded statuses, with consecutive repeats collapsed.
    pub fn statuses(&self) -> Vec<SyncStatus> {
        let mut statuses: Vec<SyncStatus> = self.states.lock().iter().map(|s| s.status).collect();
        statuses.dedup();
        statuses
    }

    /// Returns the last recorded state.
    pub fn last(&self) -> Option<SyncState> {
        self.states.lock().last().cloned()
    }

    /// Returns the number of recorded states.
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }

    /// Stops recording.
    pub fn detach(self) {
        self.subscription.unsubscribe();
    }
}

/// A file store in a temporary directory.
pub struct TempStore {
    /// The open store.
    pub store: FileStore,
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TempStore {
    /// Opens an empty store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("preferences.json");
        let store = FileStore::open(&path).expect("Failed to open store");
        Self {
            store,
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Opens a store over raw file contents.
    pub fn with_contents(contents: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("preferences.json");
        std::fs::write(&path, contents).expect("Failed to write store file");
        let store = FileStore::open(&path).expect("Failed to open store");
        Self {
            store,
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the same file again.
    pub fn reopen(&self) -> FileStore {
        FileStore::open(&self.path).expect("Failed to reopen store")
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Well-formed payload builders.
pub mod payloads {
    use prefsync_protocol::{
        FavoritesPayload, GoalsPayload, Preference, ReadingPayload, ThemePayload,
    };
    use serde_json::Value;

    fn value(preference: Preference) -> Value {
        preference.to_value().expect("Failed to encode payload")
    }

    /// A favorites payload.
    pub fn favorites(items: &[&str]) -> Value {
        value(Preference::Favorites(FavoritesPayload {
            items: items.iter().map(|s| s.to_string()).collect(),
        }))
    }

    /// A goals payload.
    pub fn goals(items: &[&str]) -> Value {
        value(Preference::Goals(GoalsPayload {
            items: items.iter().map(|s| s.to_string()).collect(),
        }))
    }

    /// A reading-position payload.
    pub fn reading(chapter: &str, position: f64) -> Value {
        value(Preference::Reading(ReadingPayload {
            chapter: chapter.to_string(),
            position,
            font_size: 16,
        }))
    }

    /// A theme payload.
    pub fn theme(mode: &str, palette: &str) -> Value {
        value(Preference::Theme(ThemePayload {
            mode: mode.to_string(),
            palette: palette.to_string(),
        }))
    }
}
