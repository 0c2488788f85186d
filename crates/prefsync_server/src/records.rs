//! Server-side preference records.

use parking_lot::RwLock;
use prefsync_protocol::{
    MergeRequest, MergeResponse, PreferenceSet, PreferenceType, SnapshotEntry, Timestamp,
    UpdateRequest,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Authoritative preference records, per identity and type.
///
/// The record store maintains:
/// - The current value of each preference type per identity
/// - The time each value was last modified
#[derive(Default)]
pub struct RecordStore {
    records: RwLock<HashMap<String, BTreeMap<PreferenceType, SnapshotEntry>>>,
}

impl RecordStore {
    /// Creates an empty record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record of an identity.
    pub fn current(&self, identity: &str) -> PreferenceSet {
        let records = self.records.read();
        PreferenceSet {
            entries: records.get(identity).cloned().unwrap_or_default(),
        }
    }

    /// Merges a client snapshot, last write wins per type.
    ///
    /// A client entry replaces the stored one only if it is strictly newer;
    /// on a tie the server keeps its value. Returns every record of the
    /// identity after the merge.
    pub fn merge(&self, identity: &str, snapshot: &MergeRequest) -> (MergeResponse, usize) {
        let mut records = self.records.write();
        let entries = records.entry(identity.to_string()).or_default();
        let mut accepted = 0;

        for (pref_type, incoming) in snapshot.iter() {
            let client_wins = entries
                .get(&pref_type)
                .is_none_or(|stored| incoming.modified_at > stored.modified_at);
            if client_wins {
                entries.insert(pref_type, incoming.clone());
                accepted += 1;
            }
        }

        (
            PreferenceSet {
                entries: entries.clone(),
            },
            accepted,
        )
    }

    /// Overwrites each included type, stamping it with `now`.
    pub fn update(&self, identity: &str, request: &UpdateRequest, now: Timestamp) {
        let mut records = self.records.write();
        let entries = records.entry(identity.to_string()).or_default();
        for (pref_type, value) in &request.preferences {
            entries.insert(*pref_type, SnapshotEntry::new(value.clone(), now));
        }
    }

    /// Sets one record directly.
    pub fn seed(
        &self,
        identity: &str,
        pref_type: PreferenceType,
        value: Value,
        modified_at: Timestamp,
    ) {
        self.records
            .write()
            .entry(identity.to_string())
            .or_default()
            .insert(pref_type, SnapshotEntry::new(value, modified_at));
    }

    /// Returns the record of one type.
    pub fn get(&self, identity: &str, pref_type: PreferenceType) -> Option<SnapshotEntry> {
        self.records
            .read()
            .get(identity)
            .and_then(|entries| entries.get(&pref_type))
            .cloned()
    }

    /// Returns the number of identities with records.
    pub fn identity_count(&self) -> usize {
        self.records.read().len()
    }

    /// Drops every record of an identity.
    pub fn remove_identity(&self, identity: &str) -> bool {
        self.records.write().remove(identity).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_last_write_wins() {
        let store = RecordStore::new();
        store.seed("u", PreferenceType::Favorites, json!({ "items": ["server"] }), Timestamp(100));
        store.seed("u", PreferenceType::Theme, json!({ "mode": "light" }), Timestamp(100));

        let snapshot = MergeRequest::new()
            .with(PreferenceType::Favorites, json!({ "items": ["client"] }), Timestamp(200))
            .with(PreferenceType::Theme, json!({ "mode": "dark" }), Timestamp(100))
            .with(PreferenceType::Goals, json!({ "items": ["g"] }), Timestamp(1));

        let (merged, accepted) = store.merge("u", &snapshot);
        assert_eq!(accepted, 2);
        assert_eq!(merged.len(), 3);
        assert_eq!(
            merged.get(PreferenceType::Favorites).unwrap().value,
            json!({ "items": ["client"] })
        );
        // Ties keep the server value.
        assert_eq!(
            merged.get(PreferenceType::Theme).unwrap().value,
            json!({ "mode": "light" })
        );
    }

    #[test]
    fn merge_returns_types_absent_from_request() {
        let store = RecordStore::new();
        store.seed("u", PreferenceType::Reading, json!({ "chapter": "c3" }), Timestamp(5));
        let (merged, accepted) = store.merge("u", &MergeRequest::new());
        assert_eq!(accepted, 0);
        assert!(merged.get(PreferenceType::Reading).is_some());
    }

    #[test]
    fn update_overwrites_and_stamps() {
        let store = RecordStore::new();
        store.seed("u", PreferenceType::Goals, json!({ "items": ["old"] }), Timestamp(900));

        let request = UpdateRequest::new().with(PreferenceType::Goals, json!({ "items": ["new"] }));
        store.update("u", &request, Timestamp(500));

        let entry = store.get("u", PreferenceType::Goals).unwrap();
        assert_eq!(entry.value, json!({ "items": ["new"] }));
        assert_eq!(entry.modified_at, Timestamp(500));
    }

    #[test]
    fn identities_are_isolated() {
        let store = RecordStore::new();
        store.seed("a", PreferenceType::Theme, json!({ "mode": "dark" }), Timestamp(1));
        assert!(store.current("b").is_empty());
        assert_eq!(store.identity_count(), 1);
        assert!(store.remove_identity("a"));
        assert!(store.current("a").is_empty());
    }
}
