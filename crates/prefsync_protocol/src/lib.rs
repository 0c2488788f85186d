//! # prefsync protocol
//!
//! Preference types and wire records shared by the sync engine, the local
//! store and the reference server.
//!
//! This crate provides:
//! - [`PreferenceType`], the closed set of independently synchronized categories
//! - Typed payloads ([`Preference`]) with lenient decoding
//! - [`Timestamp`] (milliseconds since the Unix epoch)
//! - Request/response records for `fetch-current`, `merge` and `update`
//! - A transport-agnostic HTTP envelope and the endpoint paths
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod http;
mod messages;
mod payload;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use http::{HttpRequest, HttpResponse, Method, MERGE_PATH, PREFERENCES_PATH};
pub use messages::{
    LocalSnapshot, MergeRequest, MergeResponse, PreferenceSet, SnapshotEntry, UpdateRequest,
};
pub use payload::{FavoritesPayload, GoalsPayload, Preference, ReadingPayload, ThemePayload};
pub use types::{PreferenceType, Timestamp};
