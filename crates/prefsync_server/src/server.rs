//! Main preference server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::records::RecordStore;
use prefsync_protocol::{
    HttpRequest, HttpResponse, MergeRequest, MergeResponse, PreferenceSet, PreferenceType,
    Timestamp, UpdateRequest,
};
use serde_json::Value;
use std::sync::Arc;

/// The preference server.
///
/// This server is the single remote authority for user preferences. It
/// resolves merges by per-type last-write-wins and applies updates
/// unconditionally.
///
/// # Example
///
/// ```
/// use prefsync_server::{PreferenceServer, ServerConfig};
///
/// let server = PreferenceServer::new(ServerConfig::default());
///
/// // In a real application, you would expose HTTP endpoints
/// // that call server.handle_http()
/// assert!(server.fetch_current("alice").is_empty());
/// ```
pub struct PreferenceServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl PreferenceServer {
    /// Creates a new preference server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_records(config, Arc::new(RecordStore::new()))
    }

    /// Creates a server over an existing record store.
    pub fn with_records(config: ServerConfig, records: Arc<RecordStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, records));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Returns the record store.
    pub fn records(&self) -> &Arc<RecordStore> {
        &self.context.records
    }

    /// Returns every record of an identity.
    pub fn fetch_current(&self, identity: &str) -> PreferenceSet {
        self.handler.handle_fetch(identity)
    }

    /// Merges a client snapshot for an identity.
    pub fn merge(&self, identity: &str, request: &MergeRequest) -> MergeResponse {
        self.handler.handle_merge(identity, request)
    }

    /// Applies an update for an identity, stamped with the current time.
    pub fn update(&self, identity: &str, request: &UpdateRequest) {
        self.handler
            .handle_update(identity, request, Timestamp::now());
    }

    /// Sets one record directly.
    pub fn seed(
        &self,
        identity: &str,
        pref_type: PreferenceType,
        value: Value,
        modified_at: Timestamp,
    ) {
        self.context
            .records
            .seed(identity, pref_type, value, modified_at);
    }

    /// Issues a bearer token for an identity.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Internal`] if no auth secret is configured, or
    /// [`ServerError::InvalidRequest`] for an invalid identity.
    pub fn issue_token(&self, identity: &str) -> ServerResult<String> {
        self.context
            .validator()
            .ok_or_else(|| ServerError::Internal("no auth secret configured".into()))?
            .create_token(identity)
    }

    /// Handles an HTTP request, mapping errors to status codes.
    pub fn handle_http(&self, request: &HttpRequest) -> HttpResponse {
        self.handle_http_at(request, Timestamp::now())
    }

    /// Handles an HTTP request against an explicit current time.
    pub fn handle_http_at(&self, request: &HttpRequest, now: Timestamp) -> HttpResponse {
        match self.handler.dispatch(request, now) {
            Ok(response) => {
                tracing::debug!(
                    method = request.method.as_str(),
                    path = request.route(),
                    status = response.status,
                    "request handled"
                );
                response
            }
            Err(err) => {
                if err.is_server_error() {
                    tracing::error!(error = %err, path = request.route(), "request failed");
                } else {
                    tracing::warn!(error = %err, path = request.route(), "request rejected");
                }
                HttpResponse::error(err.status_code(), err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prefsync_protocol::{Method, MERGE_PATH, PREFERENCES_PATH};
    use serde_json::json;

    #[test]
    fn server_lifecycle() {
        let server = PreferenceServer::new(ServerConfig::default());
        assert!(server.fetch_current("alice").is_empty());
        assert_eq!(server.records().identity_count(), 0);
    }

    #[test]
    fn full_merge_flow() {
        let server = PreferenceServer::new(ServerConfig::default());
        server.seed(
            "alice",
            PreferenceType::Theme,
            json!({ "mode": "light", "palette": "paper" }),
            Timestamp(2_000),
        );

        let snapshot = MergeRequest::new()
            .with(PreferenceType::Theme, json!({ "mode": "dark", "palette": "ink" }), Timestamp(1_000))
            .with(PreferenceType::Favorites, json!({ "items": ["a"] }), Timestamp(1_500));
        let request = HttpRequest::new(Method::Post, MERGE_PATH)
            .with_bearer("alice")
            .with_body(snapshot.encode().unwrap());

        let response = server.handle_http(&request);
        assert_eq!(response.status, 200);
        let merged = MergeResponse::decode(&response.body).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(
            merged.get(PreferenceType::Theme).unwrap().value,
            json!({ "mode": "light", "palette": "paper" })
        );
        assert_eq!(server.fetch_current("alice"), merged);
    }

    #[test]
    fn errors_become_status_codes() {
        let server = PreferenceServer::new(ServerConfig::default().with_auth(b"s3cret".to_vec()));
        let response = server.handle_http(&HttpRequest::new(Method::Get, PREFERENCES_PATH));
        assert_eq!(response.status, 401);
        assert!(response.error_message().contains("Missing bearer"));

        let token = server.issue_token("alice").unwrap();
        let response = server.handle_http(
            &HttpRequest::new(Method::Get, "https://prefs.example.com/v1/preferences")
                .with_bearer(token),
        );
        assert_eq!(response.status, 200);
    }

    #[test]
    fn issue_token_requires_secret() {
        let server = PreferenceServer::new(ServerConfig::default());
        assert!(server.issue_token("alice").is_err());
    }
}
