//! In-memory preference store for testing.

use crate::backend::{PreferenceStore, StoredPreference};
use crate::error::StoreResult;
use parking_lot::RwLock;
use prefsync_protocol::{PreferenceType, Timestamp};
use serde_json::Value;
use std::collections::BTreeMap;

/// An in-memory preference store.
///
/// This store keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Guest sessions that don't persist across restarts
///
/// # Example
///
/// ```rust
/// use prefsync_protocol::{PreferenceType, Timestamp};
/// use prefsync_store::{MemoryStore, PreferenceStore};
/// use serde_json::json;
///
/// let store = MemoryStore::new();
/// store
///     .save(PreferenceType::Theme, json!({ "mode": "dark", "palette": "sepia" }), Timestamp(1))
///     .unwrap();
/// assert!(store.load(PreferenceType::Theme).is_some());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<PreferenceType, StoredPreference>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl PreferenceStore for MemoryStore {
    fn load(&self, pref_type: PreferenceType) -> Option<StoredPreference> {
        self.entries.read().get(&pref_type).cloned()
    }

    fn save(
        &self,
        pref_type: PreferenceType,
        value: Value,
        modified_at: Timestamp,
    ) -> StoreResult<()> {
        self.entries
            .write()
            .insert(pref_type, StoredPreference::new(value, modified_at));
        Ok(())
    }

    fn remove(&self, pref_type: PreferenceType) -> StoreResult<()> {
        self.entries.write().remove(&pref_type);
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prefsync_protocol::Preference;
    use serde_json::json;

    #[test]
    fn save_and_load() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store
            .save(PreferenceType::Favorites, json!({ "items": ["a"] }), Timestamp(10))
            .unwrap();
        let stored = store.load(PreferenceType::Favorites).unwrap();
        assert_eq!(stored.value, json!({ "items": ["a"] }));
        assert_eq!(stored.modified_at, Timestamp(10));
        assert!(store.load(PreferenceType::Goals).is_none());
    }

    #[test]
    fn save_overwrites() {
        let store = MemoryStore::new();
        store
            .save(PreferenceType::Goals, json!({ "items": ["g1"] }), Timestamp(1))
            .unwrap();
        store
            .save(PreferenceType::Goals, json!({ "items": ["g2"] }), Timestamp(2))
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.load(PreferenceType::Goals).unwrap().value,
            json!({ "items": ["g2"] })
        );
    }

    #[test]
    fn snapshot_includes_timestamps() {
        let store = MemoryStore::new();
        store
            .save(PreferenceType::Theme, json!({ "mode": "light", "palette": "default" }), Timestamp(5))
            .unwrap();
        store
            .save(PreferenceType::Reading, json!({ "chapter": "c1", "position": 0.5, "font_size": 12 }), Timestamp(7))
            .unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.get(PreferenceType::Reading).unwrap().modified_at,
            Timestamp(7)
        );
    }

    #[test]
    fn malformed_value_loads_as_none_when_typed() {
        let store = MemoryStore::new();
        store
            .save(PreferenceType::Favorites, json!("not-a-list"), Timestamp(1))
            .unwrap();
        assert!(store.load(PreferenceType::Favorites).is_some());
        assert!(store.load_typed(PreferenceType::Favorites).is_none());

        store
            .save(PreferenceType::Goals, json!({ "items": ["g"] }), Timestamp(1))
            .unwrap();
        assert!(matches!(
            store.load_typed(PreferenceType::Goals),
            Some(Preference::Goals(_))
        ));
    }

    #[test]
    fn clear_removes_everything() {
        let store = MemoryStore::new();
        for t in PreferenceType::ALL {
            store.save(t, json!({}), Timestamp(1)).unwrap();
        }
        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
