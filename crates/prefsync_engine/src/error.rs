//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Network-path errors never escape the engine's public operations; they are
/// recorded in [`crate::SyncState::error`] and published to subscribers.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote service answered with an error status.
    #[error("remote error ({status}): {message}")]
    Remote {
        /// HTTP-style status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// The remote rejected our credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Protocol error (malformed request or response).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] prefsync_store::StoreError),

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// No async runtime is available for the real-time scheduler.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the failure is transient.
    ///
    /// Flush retries do not depend on this; it classifies failures for
    /// logging and for callers of the remote.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Remote { status, .. } => *status >= 500 || *status == 429,
            SyncError::NotConnected => true,
            _ => false,
        }
    }
}

impl From<prefsync_protocol::ProtocolError> for SyncError {
    fn from(err: prefsync_protocol::ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}
