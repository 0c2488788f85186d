//! Transport-agnostic HTTP envelope.
//!
//! The engine's HTTP remote and the reference server exchange these records;
//! the actual HTTP library (and TLS, framing, connection reuse) lives behind
//! the engine's `HttpClient` trait.

use serde::{Deserialize, Serialize};

/// Path of the preferences resource (`GET` fetches, `PUT` updates).
pub const PREFERENCES_PATH: &str = "/v1/preferences";

/// Path of the merge endpoint (`POST`).
pub const MERGE_PATH: &str = "/v1/preferences/merge";

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// An HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Request path, or a full URL.
    pub path: String,
    /// Bearer token, if authenticated.
    pub bearer: Option<String>,
    /// Request body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a request with an empty body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            bearer: None,
            body: Vec::new(),
        }
    }

    /// Sets the bearer token.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Returns the path component, stripping any scheme and host.
    pub fn route(&self) -> &str {
        match self.path.find("://") {
            Some(scheme_end) => {
                let rest = &self.path[scheme_end + 3..];
                rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
            }
            None => &self.path,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ErrorBody {
    error: String,
}

/// An HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A `200 OK` response with a body.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    /// A `204 No Content` response.
    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: Vec::new(),
        }
    }

    /// An error response with a JSON `{ "error": message }` body.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        let body = serde_json::to_vec(&ErrorBody {
            error: message.into(),
        })
        .unwrap_or_default();
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Extracts the error message from an error body, falling back to the
    /// raw body text.
    pub fn error_message(&self) -> String {
        serde_json::from_slice::<ErrorBody>(&self.body)
            .map(|b| b.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&self.body).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_strips_scheme_and_host() {
        let req = HttpRequest::new(Method::Get, "https://prefs.example.com/v1/preferences");
        assert_eq!(req.route(), PREFERENCES_PATH);

        let req = HttpRequest::new(Method::Post, MERGE_PATH);
        assert_eq!(req.route(), MERGE_PATH);

        let req = HttpRequest::new(Method::Get, "https://prefs.example.com");
        assert_eq!(req.route(), "/");
    }

    #[test]
    fn error_body_round_trip() {
        let resp = HttpResponse::error(401, "token expired");
        assert!(!resp.is_success());
        assert_eq!(resp.error_message(), "token expired");

        let raw = HttpResponse {
            status: 502,
            body: b"bad gateway".to_vec(),
        };
        assert_eq!(raw.error_message(), "bad gateway");
    }

    #[test]
    fn success_statuses() {
        assert!(HttpResponse::ok(Vec::new()).is_success());
        assert!(HttpResponse::no_content().is_success());
        assert_eq!(Method::Put.as_str(), "PUT");
    }
}
