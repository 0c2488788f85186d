//! Published sync state.

use prefsync_protocol::Timestamp;
use std::fmt;

/// The current sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Nothing has been sent yet, or the engine was reset.
    #[default]
    Idle,
    /// A flush, merge or pull is in flight.
    Syncing,
    /// The last network operation succeeded.
    Synced,
    /// The last network operation failed.
    Error,
    /// Connectivity is lost; flushes are suspended.
    Offline,
}

impl SyncStatus {
    /// Returns true while a network operation is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Syncing)
    }

    /// Returns the status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
            SyncStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot of the engine's sync state, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncState {
    /// Current status.
    pub status: SyncStatus,
    /// When the last flush or merge succeeded.
    pub last_synced: Option<Timestamp>,
    /// Number of distinct preference types waiting to be sent.
    pub pending_count: usize,
    /// Message of the last failure, cleared on success.
    pub error: Option<String>,
}

impl SyncState {
    /// Returns true if nothing is queued and nothing is broken.
    pub fn is_settled(&self) -> bool {
        self.pending_count == 0 && !matches!(self.status, SyncStatus::Error | SyncStatus::Syncing)
    }
}
