//! HTTP remote implementation.
//!
//! This module provides an HTTP-based [`RemoteService`]. The actual HTTP
//! client is abstracted via a trait to allow different implementations
//! (reqwest, hyper, a browser fetch bridge, etc.).

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteService;
use async_trait::async_trait;
use parking_lot::RwLock;
use prefsync_protocol::{
    HttpRequest, HttpResponse, MergeRequest, MergeResponse, Method, PreferenceSet,
    UpdateRequest, MERGE_PATH, PREFERENCES_PATH,
};
use std::sync::atomic::{AtomicBool, Ordering};

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Sends a request and returns the response. `Err` means no response
    /// was received at all.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;

    /// Queues a request on a transport that survives page teardown.
    /// Returns whether it was queued.
    fn send_beacon(&self, request: HttpRequest) -> bool;
}

/// HTTP-based remote preference service.
///
/// Uses JSON bodies and the routes in [`prefsync_protocol`].
pub struct HttpRemote<C: HttpClient> {
    /// Base URL of the preference service (e.g., "https://prefs.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Bearer token sent with every request.
    token: RwLock<Option<String>>,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRemote<C> {
    /// Creates a new HTTP remote.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            token: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    /// Sets the bearer token.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    /// Replaces the bearer token, e.g. after login or logout.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn request(&self, method: Method, path: &str, body: Vec<u8>) -> HttpRequest {
        let request =
            HttpRequest::new(method, format!("{}{}", self.base_url, path)).with_body(body);
        match self.token.read().as_ref() {
            Some(token) => request.with_bearer(token.clone()),
            None => request,
        }
    }

    async fn call(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        let result = self.client.send(request).await;
        let response = match result {
            Ok(response) => response,
            Err(message) => {
                *self.last_error.write() = Some(message.clone());
                return Err(SyncError::transport_retryable(message));
            }
        };

        if response.is_success() {
            *self.last_error.write() = None;
            return Ok(response);
        }

        let message = response.error_message();
        *self.last_error.write() = Some(message.clone());
        Err(match response.status {
            401 => SyncError::Unauthorized(message),
            status => SyncError::Remote { status, message },
        })
    }
}

#[async_trait]
impl<C: HttpClient> RemoteService for HttpRemote<C> {
    async fn fetch_current(&self) -> SyncResult<PreferenceSet> {
        let response = self
            .call(self.request(Method::Get, PREFERENCES_PATH, Vec::new()))
            .await?;
        Ok(PreferenceSet::decode(&response.body)?)
    }

    async fn merge(&self, snapshot: &MergeRequest) -> SyncResult<MergeResponse> {
        let body = snapshot.encode()?;
        let response = self
            .call(self.request(Method::Post, MERGE_PATH, body))
            .await?;
        Ok(MergeResponse::decode(&response.body)?)
    }

    async fn update(&self, request: &UpdateRequest) -> SyncResult<()> {
        let body = request.encode()?;
        self.call(self.request(Method::Put, PREFERENCES_PATH, body))
            .await?;
        Ok(())
    }

    fn send_keepalive(&self, request: UpdateRequest) -> bool {
        match request.encode() {
            Ok(body) => self
                .client
                .send_beacon(self.request(Method::Put, PREFERENCES_PATH, body)),
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode keep-alive update");
                false
            }
        }
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync + 'static {
    /// Handles a request and returns the response.
    fn handle(&self, request: &HttpRequest) -> HttpResponse;
}

impl<F> LoopbackServer for F
where
    F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
{
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        self(request)
    }
}

/// A loopback HTTP client that routes requests directly to an in-process
/// server.
///
/// Useful for testing without actual network overhead. Marking the client
/// unreachable simulates a dropped connection.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    reachable: AtomicBool,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            reachable: AtomicBool::new(true),
        }
    }

    /// Sets whether requests reach the server.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn dispatch(&self, request: &HttpRequest) -> Option<HttpResponse> {
        if !self.reachable.load(Ordering::SeqCst) {
            return None;
        }
        let mut routed = request.clone();
        routed.path = request.route().to_string();
        Some(self.server.handle(&routed))
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        self.dispatch(&request)
            .ok_or_else(|| "connection refused".to_string())
    }

    fn send_beacon(&self, request: HttpRequest) -> bool {
        self.dispatch(&request).is_some()
    }
}
