//! Request handlers for preference endpoints.

use crate::auth::{AuthConfig, TokenValidator};
use crate::config::{ServerConfig, DEFAULT_IDENTITY};
use crate::error::{ServerError, ServerResult};
use crate::records::RecordStore;
use prefsync_protocol::{
    HttpRequest, HttpResponse, MergeRequest, Method, PreferenceSet, Timestamp, UpdateRequest,
    MERGE_PATH, PREFERENCES_PATH,
};
use std::sync::Arc;

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Preference records (shared across all handlers).
    pub records: Arc<RecordStore>,
    validator: Option<TokenValidator>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, records: Arc<RecordStore>) -> Self {
        let validator = config.auth_secret.as_ref().map(|secret| {
            TokenValidator::new(AuthConfig::new(secret.clone()).with_expiry(config.token_expiry))
        });
        Self {
            config,
            records,
            validator,
        }
    }

    /// Returns the token validator, if a secret is configured.
    pub fn validator(&self) -> Option<&TokenValidator> {
        self.validator.as_ref()
    }
}

/// Handler for preference requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Resolves the identity a request acts for.
    ///
    /// With auth required, the bearer must be a valid token. Without it,
    /// the bearer (if any) names the identity directly.
    pub fn authenticate(&self, bearer: Option<&str>, now: Timestamp) -> ServerResult<String> {
        if !self.context.config.require_auth {
            return Ok(bearer.unwrap_or(DEFAULT_IDENTITY).to_string());
        }
        let validator = self
            .context
            .validator
            .as_ref()
            .ok_or_else(|| ServerError::Internal("auth required but no secret set".into()))?;
        let token =
            bearer.ok_or_else(|| ServerError::NotAuthorized("Missing bearer token".into()))?;
        validator.validate_token_at(token, now)
    }

    /// Handles a fetch-current request.
    pub fn handle_fetch(&self, identity: &str) -> PreferenceSet {
        self.context.records.current(identity)
    }

    /// Handles a merge request.
    pub fn handle_merge(&self, identity: &str, request: &MergeRequest) -> PreferenceSet {
        let (merged, accepted) = self.context.records.merge(identity, request);
        tracing::debug!(
            identity,
            offered = request.len(),
            accepted,
            "merged client snapshot"
        );
        merged
    }

    /// Handles an update request.
    pub fn handle_update(&self, identity: &str, request: &UpdateRequest, now: Timestamp) {
        self.context.records.update(identity, request, now);
        tracing::debug!(identity, types = request.len(), "applied update");
    }

    /// Routes an HTTP request to its handler.
    pub fn dispatch(&self, request: &HttpRequest, now: Timestamp) -> ServerResult<HttpResponse> {
        let path = request.route();
        let known = path == PREFERENCES_PATH || path == MERGE_PATH;
        if !known {
            return Err(ServerError::NotFound(path.to_string()));
        }

        let max = self.context.config.max_body_bytes;
        if request.body.len() > max {
            return Err(ServerError::PayloadTooLarge {
                size: request.body.len(),
                max,
            });
        }

        let identity = self.authenticate(request.bearer.as_deref(), now)?;

        match (request.method, path) {
            (Method::Get, PREFERENCES_PATH) => {
                Ok(HttpResponse::ok(self.handle_fetch(&identity).encode()?))
            }
            (Method::Put, PREFERENCES_PATH) => {
                let update = UpdateRequest::decode(&request.body)?;
                self.handle_update(&identity, &update, now);
                Ok(HttpResponse::no_content())
            }
            (Method::Post, MERGE_PATH) => {
                let merge = MergeRequest::decode(&request.body)?;
                Ok(HttpResponse::ok(self.handle_merge(&identity, &merge).encode()?))
            }
            (method, path) => Err(ServerError::MethodNotAllowed {
                method: method.as_str(),
                path: path.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prefsync_protocol::PreferenceType;
    use serde_json::json;

    fn create_handler(config: ServerConfig) -> RequestHandler {
        let context = Arc::new(HandlerContext::new(config, Arc::new(RecordStore::new())));
        RequestHandler::new(context)
    }

    #[test]
    fn update_then_fetch() {
        let handler = create_handler(ServerConfig::default());
        let update = UpdateRequest::new().with(PreferenceType::Favorites, json!({ "items": ["v1"] }));
        let request = HttpRequest::new(Method::Put, PREFERENCES_PATH)
            .with_body(update.encode().unwrap());

        let response = handler.dispatch(&request, Timestamp(77)).unwrap();
        assert_eq!(response.status, 204);

        let response = handler
            .dispatch(&HttpRequest::new(Method::Get, PREFERENCES_PATH), Timestamp(78))
            .unwrap();
        let current = PreferenceSet::decode(&response.body).unwrap();
        let entry = current.get(PreferenceType::Favorites).unwrap();
        assert_eq!(entry.value, json!({ "items": ["v1"] }));
        assert_eq!(entry.modified_at, Timestamp(77));
    }

    #[test]
    fn bearer_names_identity_without_auth() {
        let handler = create_handler(ServerConfig::default());
        assert_eq!(handler.authenticate(Some("alice"), Timestamp(0)).unwrap(), "alice");
        assert_eq!(handler.authenticate(None, Timestamp(0)).unwrap(), DEFAULT_IDENTITY);
    }

    #[test]
    fn auth_requires_valid_token() {
        let handler = create_handler(ServerConfig::default().with_auth(b"secret".to_vec()));
        let request = HttpRequest::new(Method::Get, PREFERENCES_PATH);
        let err = handler.dispatch(&request, Timestamp::now()).unwrap_err();
        assert_eq!(err.status_code(), 401);

        let token = handler
            .context
            .validator()
            .unwrap()
            .create_token("alice")
            .unwrap();
        let request = request.with_bearer(token);
        assert!(handler.dispatch(&request, Timestamp::now()).is_ok());
    }

    #[test]
    fn routing_errors() {
        let handler = create_handler(ServerConfig::default());

        let err = handler
            .dispatch(&HttpRequest::new(Method::Get, "/v1/unknown"), Timestamp(0))
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let err = handler
            .dispatch(&HttpRequest::new(Method::Get, MERGE_PATH), Timestamp(0))
            .unwrap_err();
        assert_eq!(err.status_code(), 405);

        let request =
            HttpRequest::new(Method::Put, PREFERENCES_PATH).with_body(b"{ not json".to_vec());
        let err = handler.dispatch(&request, Timestamp(0)).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn oversized_body_is_rejected() {
        let handler = create_handler(ServerConfig::default().with_max_body_bytes(8));
        let request = HttpRequest::new(Method::Put, PREFERENCES_PATH).with_body(vec![b' '; 9]);
        let err = handler.dispatch(&request, Timestamp(0)).unwrap_err();
        assert_eq!(err.status_code(), 413);
    }
}
