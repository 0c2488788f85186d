//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while writing the store.
///
/// Reads never fail; see [`crate::PreferenceStore::load`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store document could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A migration could not upgrade the document.
    #[error("migration to schema version {version} failed: {reason}")]
    Migration {
        /// Target schema version.
        version: u32,
        /// Why the migration failed.
        reason: String,
    },

    /// The document was written by a newer schema than this build understands.
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u32),
}
