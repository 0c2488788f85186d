//! Preference store trait definition.

use crate::error::StoreResult;
use prefsync_protocol::{LocalSnapshot, Preference, PreferenceType, SnapshotEntry, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted preference value and its last local modification time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPreference {
    /// The preference payload.
    pub value: Value,
    /// When the value was last modified.
    pub modified_at: Timestamp,
}

impl StoredPreference {
    /// Creates a new stored preference.
    pub fn new(value: Value, modified_at: Timestamp) -> Self {
        Self { value, modified_at }
    }
}

/// Local key/value storage for preferences, one entry per type.
///
/// # Invariants
///
/// - `load` never fails: missing or malformed data reads as `None`
/// - `save` replaces the whole value for a type (no partial merging)
/// - Stores must be `Send + Sync`; the engine shares them across tasks
///
/// # Implementors
///
/// - [`crate::MemoryStore`] - For testing
/// - [`crate::FileStore`] - For persistent storage
pub trait PreferenceStore: Send + Sync {
    /// Loads the value for a type, or `None` if absent or unreadable.
    fn load(&self, pref_type: PreferenceType) -> Option<StoredPreference>;

    /// Stores the value for a type.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be persisted.
    fn save(&self, pref_type: PreferenceType, value: Value, modified_at: Timestamp)
        -> StoreResult<()>;

    /// Removes the value for a type.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    fn remove(&self, pref_type: PreferenceType) -> StoreResult<()>;

    /// Removes every value.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    fn clear(&self) -> StoreResult<()> {
        for pref_type in PreferenceType::ALL {
            self.remove(pref_type)?;
        }
        Ok(())
    }

    /// Loads and decodes the value for a type.
    ///
    /// Values that do not match the type's payload shape read as `None`.
    fn load_typed(&self, pref_type: PreferenceType) -> Option<Preference> {
        let stored = self.load(pref_type)?;
        let decoded = Preference::decode(pref_type, &stored.value);
        if decoded.is_none() {
            tracing::warn!(%pref_type, "ignoring malformed stored preference");
        }
        decoded
    }

    /// Builds the full local snapshot for a merge.
    fn snapshot(&self) -> LocalSnapshot {
        let mut snapshot = LocalSnapshot::new();
        for pref_type in PreferenceType::ALL {
            if let Some(stored) = self.load(pref_type) {
                snapshot.insert(
                    pref_type,
                    SnapshotEntry::new(stored.value, stored.modified_at),
                );
            }
        }
        snapshot
    }
}
