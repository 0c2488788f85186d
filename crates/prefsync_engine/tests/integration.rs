//! Integration tests for the sync engine against the reference server.

use prefsync_engine::{
    HttpRemote, LifecycleBus, LifecycleEvent, LoopbackClient, ManualScheduler, PreferenceSync,
    SyncConfig, SyncStatus,
};
use prefsync_protocol::{HttpRequest, HttpResponse, LocalSnapshot, PreferenceType, Timestamp};
use prefsync_server::{PreferenceServer, ServerConfig};
use prefsync_store::{MemoryStore, PreferenceStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

type Handler = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;
type Engine = PreferenceSync<HttpRemote<LoopbackClient<Handler>>, ManualScheduler>;

fn loopback(server: &Arc<PreferenceServer>) -> LoopbackClient<Handler> {
    let server = Arc::clone(server);
    let handler: Handler = Box::new(move |request: &HttpRequest| server.handle_http(request));
    LoopbackClient::new(handler)
}

fn client(
    server: &Arc<PreferenceServer>,
    token: &str,
    store: Arc<MemoryStore>,
) -> (Engine, ManualScheduler) {
    let remote = HttpRemote::new("https://prefs.example.com", loopback(server)).with_token(token);
    let scheduler = ManualScheduler::starting_at(Timestamp(1_700_000_000_000));
    let engine =
        PreferenceSync::with_store(SyncConfig::default(), remote, scheduler.clone(), store)
            .unwrap();
    (engine, scheduler)
}

#[tokio::test]
async fn debounced_update_reaches_server() {
    let server = Arc::new(PreferenceServer::new(ServerConfig::default()));
    let (engine, scheduler) = client(&server, "alice", Arc::new(MemoryStore::new()));

    engine.update(PreferenceType::Favorites, json!({ "items": ["v1"] }));
    engine.update(PreferenceType::Favorites, json!({ "items": ["v1", "v2"] }));
    assert!(server.fetch_current("alice").is_empty());

    scheduler.advance(Duration::from_millis(1_000)).await;

    let current = server.fetch_current("alice");
    assert_eq!(
        current.get(PreferenceType::Favorites).unwrap().value,
        json!({ "items": ["v1", "v2"] })
    );
    assert_eq!(engine.state().status, SyncStatus::Synced);
    assert!(server.fetch_current("bob").is_empty());
}

#[tokio::test]
async fn login_merge_resolves_by_timestamp() {
    let server = Arc::new(PreferenceServer::new(ServerConfig::default()));
    server.seed(
        "alice",
        PreferenceType::Theme,
        json!({ "mode": "dark", "palette": "ink" }),
        Timestamp(2_000),
    );
    server.seed(
        "alice",
        PreferenceType::Goals,
        json!({ "items": ["old"] }),
        Timestamp(1_000),
    );

    let store = Arc::new(MemoryStore::new());
    store
        .save(PreferenceType::Theme, json!({ "mode": "light", "palette": "paper" }), Timestamp(1_500))
        .unwrap();
    store
        .save(PreferenceType::Goals, json!({ "items": ["new"] }), Timestamp(1_800))
        .unwrap();
    let (engine, _scheduler) = client(&server, "alice", Arc::clone(&store));

    let merged = engine.merge_local().await.unwrap();
    assert_eq!(merged.len(), 2);

    // The server's newer theme wins; the client's newer goals win.
    assert_eq!(
        store.load(PreferenceType::Theme).unwrap().value,
        json!({ "mode": "dark", "palette": "ink" })
    );
    assert_eq!(
        server.fetch_current("alice").get(PreferenceType::Goals).unwrap().value,
        json!({ "items": ["new"] })
    );
    assert_eq!(engine.state().status, SyncStatus::Synced);
}

#[tokio::test]
async fn unauthorized_update_is_retried_then_reported() {
    let server = Arc::new(PreferenceServer::new(
        ServerConfig::default().with_auth(b"integration-secret".to_vec()),
    ));
    let (engine, scheduler) = client(&server, "forged.1.00", Arc::new(MemoryStore::new()));

    engine.update(PreferenceType::Reading, json!({ "chapter": "c1" }));
    scheduler.advance(Duration::from_secs(3)).await;
    assert_eq!(engine.state().status, SyncStatus::Error);
    assert_eq!(scheduler.pending_timers(), 1);

    scheduler.advance(Duration::from_secs(120)).await;

    let state = engine.state();
    assert_eq!(state.status, SyncStatus::Error);
    assert!(state.error.unwrap().contains("unauthorized"));
    assert_eq!(state.pending_count, 1);
    assert_eq!(scheduler.pending_timers(), 0);
}

#[tokio::test]
async fn signed_token_reaches_its_identity() {
    let server = Arc::new(PreferenceServer::new(
        ServerConfig::default().with_auth(b"integration-secret".to_vec()),
    ));
    let token = server.issue_token("carol").unwrap();
    let (engine, _scheduler) = client(&server, &token, Arc::new(MemoryStore::new()));

    engine.update(PreferenceType::Theme, json!({ "mode": "dark", "palette": "ink" }));
    engine.flush().await;

    assert!(server.fetch_current("carol").get(PreferenceType::Theme).is_some());
}

#[tokio::test]
async fn outage_is_retried_until_server_returns() {
    let server = Arc::new(PreferenceServer::new(ServerConfig::default()));
    let (engine, scheduler) = client(&server, "alice", Arc::new(MemoryStore::new()));

    engine.remote().client().set_reachable(false);
    engine.update(PreferenceType::Goals, json!({ "items": ["g1"] }));
    scheduler.advance(Duration::from_millis(1_000)).await;
    assert_eq!(engine.state().status, SyncStatus::Error);

    engine.remote().client().set_reachable(true);
    scheduler.advance(Duration::from_millis(1_000)).await;
    assert_eq!(engine.state().status, SyncStatus::Synced);
    assert!(server.fetch_current("alice").get(PreferenceType::Goals).is_some());
}

#[tokio::test]
async fn unload_sends_keepalive_to_server() {
    let server = Arc::new(PreferenceServer::new(ServerConfig::default()));
    let (engine, _scheduler) = client(&server, "alice", Arc::new(MemoryStore::new()));
    let bus = Arc::new(LifecycleBus::new());
    let binding = engine.bind_lifecycle(bus.clone());

    engine.update(PreferenceType::Reading, json!({ "chapter": "c7", "position": 0.5 }));
    bus.emit(LifecycleEvent::Unload);

    assert_eq!(engine.pending_count(), 0);
    assert!(server.fetch_current("alice").get(PreferenceType::Reading).is_some());
    binding.teardown();
}

#[tokio::test]
async fn logout_then_pull_for_next_identity() {
    let server = Arc::new(PreferenceServer::new(ServerConfig::default()));
    server.seed("bob", PreferenceType::Favorites, json!({ "items": ["b"] }), Timestamp(1));

    let store = Arc::new(MemoryStore::new());
    let (engine, scheduler) = client(&server, "alice", Arc::clone(&store));
    engine.update(PreferenceType::Favorites, json!({ "items": ["a"] }));

    engine.reset();
    store.clear().unwrap();
    engine.remote().set_token(Some("bob".into()));
    scheduler.advance(Duration::from_secs(10)).await;
    assert!(server.fetch_current("alice").is_empty());

    let pulled = engine.pull().await.unwrap();
    assert_eq!(pulled.len(), 1);
    assert_eq!(
        store.load(PreferenceType::Favorites).unwrap().value,
        json!({ "items": ["b"] })
    );

    assert!(engine.merge(LocalSnapshot::new()).await.is_some());
}
