//! # prefsync store
//!
//! The local persistent store the sync engine reads snapshots from and
//! writes merge results to.
//!
//! This crate provides:
//! - [`PreferenceStore`], get/set per preference type with graceful degradation
//! - [`MemoryStore`] for tests and ephemeral sessions
//! - [`FileStore`], a versioned JSON document on disk
//! - Schema migrations for older store documents
//!
//! Missing or malformed persisted data is never an error: it reads as "no
//! value" and is logged.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
pub mod migration;

pub use backend::{PreferenceStore, StoredPreference};
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use migration::{MigrationReport, CURRENT_SCHEMA_VERSION};
