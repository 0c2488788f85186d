//! # prefsync testkit
//!
//! Test utilities for prefsync.
//!
//! This crate provides:
//! - Engine fixtures on a virtual clock, against a scripted remote or the
//!   in-process reference server
//! - A state recorder for published sync states
//! - Temporary file stores
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use prefsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn update_reaches_server() {
//!     let stack = TestStack::new();
//!     stack.engine.update(PreferenceType::Theme, payloads::theme("dark", "ink"));
//!     stack.advance(Duration::from_secs(1)).await;
//!     assert!(stack.server_value(PreferenceType::Theme).is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use prefsync_protocol::{PreferenceType, Timestamp};
    pub use std::time::Duration;
}

pub use fixtures::*;
pub use generators::*;
