//! # prefsync engine
//!
//! Client-side coordinator that keeps small, independently mutated user
//! preferences consistent between a local store and a remote authority.
//!
//! This crate provides:
//! - A per-type pending-change queue with tiered debounce timers
//! - Batched flushes with bounded, fixed-schedule retries
//! - Throttled, mutually exclusive merge of the full local snapshot
//! - Lifecycle and connectivity hooks (hidden, unload, online, offline)
//! - Ordered, panic-isolated state publication
//! - HTTP remote abstraction with an in-process loopback client
//!
//! ## Architecture
//!
//! ```text
//! update(type, value) ──► PendingQueue ──► debounce timer ──► flush
//!                                                              │
//!                         retry timer ◄── failure ◄── remote.update
//!                                                              │
//!                 subscribers ◄── SyncState ◄── success ◄──────┘
//! ```
//!
//! All timers go through a [`Scheduler`], so the engine runs on real time
//! ([`TokioScheduler`]) or on a virtual clock ([`ManualScheduler`]).
//!
//! ## Key Invariants
//!
//! - A change is never both queued and in flight
//! - `pending_count` equals the number of distinct queued types
//! - At most one flush and one merge are in flight at a time
//! - No lock is held across an `.await`
//! - Network failures surface only through [`SyncState`]

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod http;
mod lifecycle;
mod publisher;
mod queue;
mod remote;
mod scheduler;
mod state;

pub use config::{RetryConfig, SyncConfig};
pub use engine::PreferenceSync;
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpRemote, LoopbackClient, LoopbackServer};
pub use lifecycle::{
    LifecycleBinding, LifecycleBus, LifecycleEvent, LifecycleHandler, LifecycleSource, ListenerId,
};
pub use publisher::{Listener, StatePublisher, Subscription};
pub use queue::{Batch, PendingChange, PendingQueue};
pub use remote::{MockRemote, RemoteService};
pub use scheduler::{ManualScheduler, Scheduler, Task, TimerId, TokioScheduler};
pub use state::{SyncState, SyncStatus};
