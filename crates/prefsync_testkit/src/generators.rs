//! Property-based test generators using proptest.
//!
//! Provides strategies for generating well-formed preference payloads,
//! snapshots and client write sequences.

use prefsync_protocol::{
    FavoritesPayload, GoalsPayload, LocalSnapshot, Preference, PreferenceType, ReadingPayload,
    SnapshotEntry, ThemePayload, Timestamp,
};
use proptest::prelude::*;
use serde_json::Value;
use std::time::Duration;

/// Strategy for generating preference types.
pub fn pref_type_strategy() -> impl Strategy<Value = PreferenceType> {
    prop::sample::select(PreferenceType::ALL.to_vec())
}

fn identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating a typed preference of the given type.
pub fn preference_of(pref_type: PreferenceType) -> BoxedStrategy<Preference> {
    match pref_type {
        PreferenceType::Favorites => prop::collection::vec(identifier_strategy(), 0..8)
            .prop_map(|items| Preference::Favorites(FavoritesPayload { items }))
            .boxed(),
        PreferenceType::Goals => prop::collection::vec(identifier_strategy(), 0..4)
            .prop_map(|items| Preference::Goals(GoalsPayload { items }))
            .boxed(),
        // Positions are multiples of 1/1024 so they survive JSON exactly.
        PreferenceType::Reading => (identifier_strategy(), 0u32..=1024, 8u16..40)
            .prop_map(|(chapter, steps, font_size)| {
                Preference::Reading(ReadingPayload {
                    chapter,
                    position: f64::from(steps) / 1024.0,
                    font_size,
                })
            })
            .boxed(),
        PreferenceType::Theme => (
            prop::sample::select(vec!["light", "dark", "system"]),
            identifier_strategy(),
        )
            .prop_map(|(mode, palette)| {
                Preference::Theme(ThemePayload {
                    mode: mode.to_string(),
                    palette,
                })
            })
            .boxed(),
    }
}

/// Strategy for generating a typed preference of any type.
pub fn preference_strategy() -> impl Strategy<Value = Preference> {
    pref_type_strategy().prop_flat_map(preference_of)
}

/// Strategy for generating the JSON payload of a given type.
pub fn payload_strategy(pref_type: PreferenceType) -> impl Strategy<Value = Value> {
    preference_of(pref_type)
        .prop_map(|preference| preference.to_value().unwrap_or(Value::Null))
}

/// Strategy for generating timestamps in a plausible range.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (1_600_000_000_000u64..1_900_000_000_000).prop_map(Timestamp)
}

/// Strategy for generating a snapshot covering a random subset of types.
pub fn snapshot_strategy() -> impl Strategy<Value = LocalSnapshot> {
    prop::collection::vec(
        pref_type_strategy().prop_flat_map(|pref_type| {
            (
                Just(pref_type),
                payload_strategy(pref_type),
                timestamp_strategy(),
            )
        }),
        0..6,
    )
    .prop_map(|entries| {
        let mut snapshot = LocalSnapshot::new();
        for (pref_type, value, modified_at) in entries {
            snapshot.insert(pref_type, SnapshotEntry::new(value, modified_at));
        }
        snapshot
    })
}

/// A client-side action against the sync engine.
#[derive(Debug, Clone)]
pub enum ClientOp {
    /// Write a value
    Update {
        /// Preference type
        pref_type: PreferenceType,
        /// New value
        value: Value,
    },
    /// Let virtual time pass
    Wait(Duration),
}

/// Strategy for generating client actions.
pub fn client_op_strategy() -> impl Strategy<Value = ClientOp> {
    prop_oneof![
        4 => pref_type_strategy().prop_flat_map(|pref_type| {
            payload_strategy(pref_type).prop_map(move |value| ClientOp::Update { pref_type, value })
        }),
        1 => (0u64..3_000).prop_map(|ms| ClientOp::Wait(Duration::from_millis(ms))),
    ]
}

/// Strategy for generating a sequence of client actions.
pub fn write_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<ClientOp>> {
    prop::collection::vec(client_op_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_payloads_decode(preference in preference_strategy()) {
            let pref_type = preference.pref_type();
            let value = preference.to_value().unwrap();
            prop_assert_eq!(Preference::decode(pref_type, &value), Some(preference));
        }

        #[test]
        fn snapshot_holds_one_entry_per_type(snapshot in snapshot_strategy()) {
            prop_assert!(snapshot.len() <= PreferenceType::ALL.len());
        }

        #[test]
        fn sequences_respect_bounds(ops in write_sequence_strategy(1, 10)) {
            prop_assert!(!ops.is_empty() && ops.len() < 10);
        }
    }
}
