//! Property tests for the sync engine and the reference server.

use prefsync_engine::{RetryConfig, SyncConfig, SyncStatus};
use prefsync_protocol::{MergeRequest, PreferenceType};
use prefsync_server::RecordStore;
use prefsync_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
        .block_on(future)
}

fn last_writes(ops: &[ClientOp]) -> BTreeMap<PreferenceType, Value> {
    let mut last = BTreeMap::new();
    for op in ops {
        if let ClientOp::Update { pref_type, value } = op {
            last.insert(*pref_type, value.clone());
        }
    }
    last
}

fn retry_strategy() -> impl Strategy<Value = RetryConfig> {
    (
        0u32..6,
        prop::collection::vec(1u64..5_000, 1..4),
    )
        .prop_map(|(max_retries, backoff)| {
            RetryConfig::new(
                max_retries,
                backoff.into_iter().map(Duration::from_millis).collect(),
            )
        })
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn pending_holds_latest_value_per_type(
        writes in prop::collection::vec(
            pref_type_strategy().prop_flat_map(|t| (Just(t), payload_strategy(t))),
            1..20,
        )
    ) {
        let stack = MockStack::new();
        for (pref_type, value) in &writes {
            stack.engine.update(*pref_type, value.clone());
        }

        let mut expected = BTreeMap::new();
        for (pref_type, value) in writes {
            expected.insert(pref_type, value);
        }
        prop_assert_eq!(stack.engine.pending_count(), expected.len());
        prop_assert_eq!(stack.engine.state().pending_count, expected.len());
        for (pref_type, value) in expected {
            prop_assert_eq!(stack.engine.pending(pref_type), Some(value));
        }
        prop_assert_eq!(stack.remote.update_count(), 0);
    }

    #[test]
    fn server_converges_to_last_write(ops in write_sequence_strategy(1, 25)) {
        let stack = TestStack::new();
        block_on(async {
            for op in &ops {
                match op {
                    ClientOp::Update { pref_type, value } => {
                        stack.engine.update(*pref_type, value.clone());
                    }
                    ClientOp::Wait(by) => stack.advance(*by).await,
                }
            }
            stack.advance(Duration::from_secs(10)).await;
        });

        for (pref_type, value) in last_writes(&ops) {
            prop_assert_eq!(stack.server_value(pref_type), Some(value));
        }
        let state = stack.engine.state();
        prop_assert_eq!(state.pending_count, 0);
        if !last_writes(&ops).is_empty() {
            prop_assert_eq!(state.status, SyncStatus::Synced);
        }
    }

    #[test]
    fn failed_batch_is_attempted_at_most_max_retries_plus_one(retry in retry_strategy()) {
        let max_retries = retry.max_retries;
        let stack = MockStack::with_config(SyncConfig::default().with_retry(retry));
        stack.remote.fail_all_updates(true);

        block_on(async {
            stack.engine.update(PreferenceType::Goals, payloads::goals(&["g"]));
            stack.advance(Duration::from_secs(600)).await;
        });

        prop_assert_eq!(stack.remote.update_count(), max_retries as usize + 1);
        prop_assert_eq!(stack.scheduler.pending_timers(), 0);
        let state = stack.engine.state();
        prop_assert_eq!(state.status, SyncStatus::Error);
        prop_assert_eq!(state.pending_count, 1);
    }

    #[test]
    fn reset_leaves_nothing_behind(ops in write_sequence_strategy(1, 15)) {
        let stack = MockStack::new();
        stack.remote.fail_all_updates(true);
        block_on(async {
            for op in &ops {
                match op {
                    ClientOp::Update { pref_type, value } => {
                        stack.engine.update(*pref_type, value.clone());
                    }
                    ClientOp::Wait(by) => stack.advance(*by).await,
                }
            }
        });

        stack.engine.reset();
        let state = stack.engine.state();
        prop_assert_eq!(state.status, SyncStatus::Idle);
        prop_assert_eq!(state.pending_count, 0);
        prop_assert_eq!(state.error, None);
        prop_assert_eq!(state.last_synced, None);
        prop_assert_eq!(stack.scheduler.pending_timers(), 0);

        let calls = stack.remote.update_count();
        block_on(stack.advance(Duration::from_secs(600)));
        prop_assert_eq!(stack.remote.update_count(), calls);
    }

    #[test]
    fn server_merge_keeps_newer_entry_per_type(
        stored in snapshot_strategy(),
        offered in snapshot_strategy(),
    ) {
        let records = RecordStore::new();
        for (pref_type, entry) in stored.iter() {
            records.seed("alice", pref_type, entry.value.clone(), entry.modified_at);
        }

        let request: MergeRequest = offered.clone();
        let (merged, _) = records.merge("alice", &request);

        for pref_type in PreferenceType::ALL {
            let expected = match (stored.get(pref_type), offered.get(pref_type)) {
                (Some(server), Some(client)) if client.modified_at > server.modified_at => {
                    Some(client)
                }
                (Some(server), _) => Some(server),
                (None, client) => client,
            };
            prop_assert_eq!(merged.get(pref_type), expected);
        }
        prop_assert_eq!(records.current("alice"), merged);
    }
}
