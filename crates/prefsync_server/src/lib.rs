//! # prefsync server
//!
//! Reference remote authority for prefsync.
//!
//! This crate provides:
//! - The three preference endpoints (fetch-current, merge, update)
//! - Per-identity preference records
//! - Per-type last-write-wins merge adjudication
//! - Authentication (HMAC-SHA256 tokens)
//!
//! # Authentication
//!
//! Authentication is optional but recommended for production:
//!
//! ```rust
//! use prefsync_server::{AuthConfig, PreferenceServer, ServerConfig, TokenValidator};
//!
//! let secret = b"my-secure-secret-32-bytes-long!".to_vec();
//! let server = PreferenceServer::new(ServerConfig::default().with_auth(secret.clone()));
//!
//! // Issue tokens for signed-in users
//! let token = server.issue_token("alice").unwrap();
//! let validator = TokenValidator::new(AuthConfig::new(secret));
//! assert_eq!(validator.validate_token(&token).unwrap(), "alice");
//! ```
//!
//! Without auth, the request's bearer (if any) names the identity directly.
//!
//! # Protocol
//!
//! | Route | Effect |
//! |-------|--------|
//! | `GET /v1/preferences` | every record of the identity |
//! | `POST /v1/preferences/merge` | newer client entries win; returns every record |
//! | `PUT /v1/preferences` | overwrite included types, stamped with server time |

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod records;
mod server;

pub use auth::{AuthConfig, TokenValidator};
pub use config::{ServerConfig, DEFAULT_IDENTITY};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use records::RecordStore;
pub use server::PreferenceServer;
