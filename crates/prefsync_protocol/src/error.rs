//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol records.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A preference type name was not recognized.
    #[error("unknown preference type: {0}")]
    UnknownType(String),

    /// A payload did not match the shape of its preference type.
    #[error("invalid {pref_type} payload: {reason}")]
    InvalidPayload {
        /// The preference type the payload was decoded as.
        pref_type: String,
        /// Why decoding failed.
        reason: String,
    },
}
