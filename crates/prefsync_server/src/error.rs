//! Error types for the preference server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the preference server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Authorization failed.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// No such route.
    #[error("not found: {0}")]
    NotFound(String),

    /// The route exists but not for this method.
    #[error("method {method} not allowed on {path}")]
    MethodNotAllowed {
        /// Request method.
        method: &'static str,
        /// Request path.
        path: String,
    },

    /// The request body exceeds the configured limit.
    #[error("payload too large: {size} bytes exceeds {max}")]
    PayloadTooLarge {
        /// Body size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::NotAuthorized(_) => 401,
            ServerError::NotFound(_) => 404,
            ServerError::MethodNotAllowed { .. } => 405,
            ServerError::PayloadTooLarge { .. } => 413,
            ServerError::Internal(_) => 500,
        }
    }
}

impl From<prefsync_protocol::ProtocolError> for ServerError {
    fn from(err: prefsync_protocol::ProtocolError) -> Self {
        ServerError::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn status_codes() {
        assert_eq!(ServerError::NotAuthorized("x".into()).status_code(), 401);
        assert_eq!(ServerError::NotFound("/x".into()).status_code(), 404);
        assert_eq!(ServerError::Internal("x".into()).status_code(), 500);
        let err = ServerError::PayloadTooLarge { size: 10, max: 5 };
        assert_eq!(err.status_code(), 413);
        assert!(err.to_string().contains("10"));
    }
}
