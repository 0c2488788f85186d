//! Pending-change queue.
//!
//! Holds at most one pending payload per preference type. Capturing a batch
//! moves every entry out of the queue, so a change is never both queued and
//! in flight.

use prefsync_protocol::{PreferenceType, Timestamp, UpdateRequest};
use serde_json::Value;
use std::collections::BTreeMap;

/// The latest unsent value of one preference type.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    /// Preference type.
    pub pref_type: PreferenceType,
    /// Full current value for the type.
    pub payload: Value,
    /// When the value was queued.
    pub enqueued_at: Timestamp,
}

/// Changes captured atomically for one flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    changes: Vec<PendingChange>,
}

impl Batch {
    /// Returns the captured changes in type order.
    pub fn changes(&self) -> &[PendingChange] {
        &self.changes
    }

    /// Returns the number of captured types.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Collapses the batch into one combined update request.
    pub fn to_request(&self) -> UpdateRequest {
        let mut request = UpdateRequest::new();
        for change in &self.changes {
            request
                .preferences
                .insert(change.pref_type, change.payload.clone());
        }
        request
    }
}

/// Latest pending payload per preference type.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: BTreeMap<PreferenceType, PendingChange>,
}

impl PendingQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a payload, replacing any pending payload of the same type.
    pub fn enqueue(&mut self, pref_type: PreferenceType, payload: Value, now: Timestamp) {
        self.entries.insert(
            pref_type,
            PendingChange {
                pref_type,
                payload,
                enqueued_at: now,
            },
        );
    }

    /// Moves every entry into a batch, leaving the queue empty.
    pub fn take_batch(&mut self) -> Batch {
        let entries = std::mem::take(&mut self.entries);
        Batch {
            changes: entries.into_values().collect(),
        }
    }

    /// Puts a failed batch back, skipping types that were re-queued since
    /// the batch was captured. Returns how many changes were restored.
    pub fn restore(&mut self, batch: Batch) -> usize {
        let mut restored = 0;
        for change in batch.changes {
            if let std::collections::btree_map::Entry::Vacant(slot) =
                self.entries.entry(change.pref_type)
            {
                slot.insert(change);
                restored += 1;
            }
        }
        restored
    }

    /// Returns the pending change for a type.
    pub fn get(&self, pref_type: PreferenceType) -> Option<&PendingChange> {
        self.entries.get(&pref_type)
    }

    /// Returns the queued types.
    pub fn types(&self) -> impl Iterator<Item = PreferenceType> + '_ {
        self.entries.keys().copied()
    }

    /// Returns the number of distinct queued types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every pending change.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
