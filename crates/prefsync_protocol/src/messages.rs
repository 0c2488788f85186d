//! Request and response records for the remote preference service.
//!
//! All records are JSON objects keyed by preference type name:
//!
//! ```text
//! update:  { "favorites": { "items": ["v1"] }, "theme": { ... } }
//! merge:   { "favorites": { "value": { ... }, "modified_at": 1700000000000 } }
//! ```

use crate::error::ProtocolResult;
use crate::types::{PreferenceType, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One combined update: the full current value of each included type.
///
/// The server overwrites each included type unconditionally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateRequest {
    /// Payload per preference type.
    pub preferences: BTreeMap<PreferenceType, Value>,
}

impl UpdateRequest {
    /// Creates an empty update request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the payload for a type.
    pub fn with(mut self, pref_type: PreferenceType, payload: Value) -> Self {
        self.preferences.insert(pref_type, payload);
        self
    }

    /// Returns the payload for a type.
    pub fn get(&self, pref_type: PreferenceType) -> Option<&Value> {
        self.preferences.get(&pref_type)
    }

    /// Returns the number of included types.
    pub fn len(&self) -> usize {
        self.preferences.len()
    }

    /// Returns true if no type is included.
    pub fn is_empty(&self) -> bool {
        self.preferences.is_empty()
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A preference value together with its last modification time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// The preference payload.
    pub value: Value,
    /// When the value was last modified on the side that sent it.
    pub modified_at: Timestamp,
}

impl SnapshotEntry {
    /// Creates a new entry.
    pub fn new(value: Value, modified_at: Timestamp) -> Self {
        Self { value, modified_at }
    }
}

/// A set of timestamped preference values keyed by type.
///
/// This is the shape of the local snapshot sent to `merge`, of the merge
/// result, and of `fetch-current` responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreferenceSet {
    /// Entries per preference type.
    pub entries: BTreeMap<PreferenceType, SnapshotEntry>,
}

/// The caller's full local preference state, sent to the merge endpoint.
pub type LocalSnapshot = PreferenceSet;

/// Body of a merge request.
pub type MergeRequest = PreferenceSet;

/// Body of a merge response: the server-adjudicated result.
pub type MergeResponse = PreferenceSet;

impl PreferenceSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry.
    pub fn with(mut self, pref_type: PreferenceType, value: Value, modified_at: Timestamp) -> Self {
        self.insert(pref_type, SnapshotEntry::new(value, modified_at));
        self
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, pref_type: PreferenceType, entry: SnapshotEntry) {
        self.entries.insert(pref_type, entry);
    }

    /// Returns the entry for a type.
    pub fn get(&self, pref_type: PreferenceType) -> Option<&SnapshotEntry> {
        self.entries.get(&pref_type)
    }

    /// Iterates over entries in type order.
    pub fn iter(&self) -> impl Iterator<Item = (PreferenceType, &SnapshotEntry)> {
        self.entries.iter().map(|(t, e)| (*t, e))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_request_is_keyed_by_type_name() {
        let request = UpdateRequest::new()
            .with(PreferenceType::Favorites, json!({ "items": ["v1"] }))
            .with(PreferenceType::Theme, json!({ "mode": "dark", "palette": "sepia" }));

        let encoded: Value = serde_json::from_slice(&request.encode().unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({
                "favorites": { "items": ["v1"] },
                "theme": { "mode": "dark", "palette": "sepia" }
            })
        );
    }

    #[test]
    fn merge_request_carries_timestamps() {
        let snapshot = LocalSnapshot::new().with(
            PreferenceType::Goals,
            json!({ "items": ["g1"] }),
            Timestamp(1_700_000_000_000),
        );

        let encoded: Value = serde_json::from_slice(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({ "goals": { "value": { "items": ["g1"] }, "modified_at": 1_700_000_000_000u64 } })
        );

        let decoded = MergeRequest::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn unknown_type_key_is_rejected() {
        let body = br#"{ "bookmarks": { "items": [] } }"#;
        assert!(UpdateRequest::decode(body).is_err());
    }
}
