//! Simulate command implementation.
//!
//! Runs one client session against an in-process reference server in real
//! time: a login merge, a burst of writes, and the debounced flush that
//! follows.

use prefsync_engine::{
    HttpRemote, LoopbackClient, PreferenceSync, RetryConfig, SyncConfig, SyncState,
    TokioScheduler,
};
use prefsync_protocol::{HttpRequest, HttpResponse, PreferenceType, Timestamp};
use prefsync_server::{PreferenceServer, ServerConfig};
use prefsync_store::{FileStore, MemoryStore, PreferenceStore};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SIMULATION_SECRET: &[u8] = b"prefsync-simulation-secret";
const BASE_URL: &str = "http://127.0.0.1:8080";

/// Options for a simulated session.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Local store file; an in-memory store when absent.
    pub store_path: Option<PathBuf>,
    /// Number of favorites writes.
    pub writes: usize,
    /// Debounce delay for every type, in milliseconds.
    pub debounce_ms: u64,
    /// Maximum retries per failed flush.
    pub max_retries: u32,
    /// Whether the server requires signed tokens.
    pub auth: bool,
    /// Identity the client acts for.
    pub identity: String,
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(simulate(options))
}

fn sync_config(options: &SimulateOptions) -> SyncConfig {
    let delay = Duration::from_millis(options.debounce_ms);
    let config = PreferenceType::ALL
        .into_iter()
        .fold(SyncConfig::new(), |config, pref_type| {
            config.with_debounce(pref_type, delay)
        });
    config.with_retry(RetryConfig {
        max_retries: options.max_retries,
        ..RetryConfig::default()
    })
}

fn print_state(state: &SyncState) {
    println!(
        "  [{}] pending={} last_synced={} error={}",
        state.status.as_str(),
        state.pending_count,
        state
            .last_synced
            .map_or_else(|| "-".to_string(), |ts| ts.0.to_string()),
        state.error.as_deref().unwrap_or("-"),
    );
}

async fn simulate(options: &SimulateOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut server_config = ServerConfig::default();
    if options.auth {
        server_config = server_config.with_auth(SIMULATION_SECRET.to_vec());
    }
    let server = Arc::new(PreferenceServer::new(server_config));

    // An older server-side theme the login merge has to reconcile.
    let stale = Timestamp(Timestamp::now().0.saturating_sub(60_000));
    server.seed(
        &options.identity,
        PreferenceType::Theme,
        json!({ "mode": "light", "palette": "paper" }),
        stale,
    );

    let token = if options.auth {
        server.issue_token(&options.identity)?
    } else {
        options.identity.clone()
    };

    let handler = {
        let server = Arc::clone(&server);
        move |request: &HttpRequest| -> HttpResponse { server.handle_http(request) }
    };
    let remote = HttpRemote::new(BASE_URL, LoopbackClient::new(handler)).with_token(token);

    let store: Arc<dyn PreferenceStore> = match &options.store_path {
        Some(path) => Arc::new(FileStore::open_with_create_dirs(path)?),
        None => Arc::new(MemoryStore::new()),
    };
    store.save(
        PreferenceType::Theme,
        json!({ "mode": "dark", "palette": "ink" }),
        Timestamp::now(),
    )?;

    let engine = PreferenceSync::with_store(
        sync_config(options),
        remote,
        TokioScheduler::current()?,
        Arc::clone(&store),
    )?;

    println!("Sync states");
    println!("===========");
    let subscription = engine.subscribe(print_state);

    info!(identity = %options.identity, "merging local snapshot");
    if let Some(merged) = engine.merge_local().await {
        info!(types = merged.len(), "login merge complete");
    }

    let mut items = Vec::with_capacity(options.writes);
    for i in 1..=options.writes {
        items.push(format!("item-{i}"));
        engine.update(PreferenceType::Favorites, json!({ "items": items }));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    tokio::time::sleep(Duration::from_millis(options.debounce_ms + 100)).await;
    engine.flush().await;
    subscription.unsubscribe();

    println!("\nServer records for {}", options.identity);
    println!("===========");
    for (pref_type, entry) in server.fetch_current(&options.identity).iter() {
        println!("  {} @ {}: {}", pref_type, entry.modified_at.0, entry.value);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SimulateOptions {
        SimulateOptions {
            store_path: None,
            writes: 3,
            debounce_ms: 10,
            max_retries: 1,
            auth: false,
            identity: "tester".into(),
        }
    }

    #[test]
    fn config_applies_flags() {
        let config = sync_config(&options());
        for pref_type in PreferenceType::ALL {
            assert_eq!(config.debounce_for(pref_type), Duration::from_millis(10));
        }
        assert_eq!(config.retry.max_retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn simulation_runs_with_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        let options = SimulateOptions {
            store_path: Some(path.clone()),
            auth: true,
            ..options()
        };
        run(&options).unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(
            store.load(PreferenceType::Favorites).unwrap().value,
            json!({ "items": ["item-1", "item-2", "item-3"] })
        );
    }
}
