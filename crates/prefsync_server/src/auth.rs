//! Authentication support for the preference server.
//!
//! This module provides token-based authentication using HMAC-SHA256.
//! Tokens bind an identity to an issue time for expiration checking.
//!
//! ## Token Format
//!
//! ```text
//! <identity>.<issued_at_ms>.<hex hmac-sha256 of "<identity>.<issued_at_ms>">
//! ```
//!
//! Identities must be non-empty and must not contain `.`.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use prefsync_protocol::Timestamp;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Issues and validates bearer tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Creates a token for an identity, issued now.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidRequest`] for an empty identity or one
    /// containing `.`.
    pub fn create_token(&self, identity: &str) -> ServerResult<String> {
        self.create_token_at(identity, Timestamp::now())
    }

    /// Creates a token with an explicit issue time.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidRequest`] for an empty identity or one
    /// containing `.`.
    pub fn create_token_at(&self, identity: &str, issued_at: Timestamp) -> ServerResult<String> {
        if identity.is_empty() || identity.contains('.') {
            return Err(ServerError::InvalidRequest(format!(
                "invalid identity {identity:?}"
            )));
        }
        let payload = format!("{identity}.{}", issued_at.as_millis());
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();
        Ok(format!("{payload}.{}", hex::encode(signature)))
    }

    /// Validates a token and returns the identity it was issued to.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotAuthorized`] for malformed, tampered or
    /// expired tokens.
    pub fn validate_token(&self, token: &str) -> ServerResult<String> {
        self.validate_token_at(token, Timestamp::now())
    }

    /// Validates a token against an explicit current time.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotAuthorized`] for malformed, tampered or
    /// expired tokens.
    pub fn validate_token_at(&self, token: &str, now: Timestamp) -> ServerResult<String> {
        let malformed = || ServerError::NotAuthorized("Malformed token".into());

        let (payload, signature_hex) = token.rsplit_once('.').ok_or_else(malformed)?;
        let (identity, issued_at) = payload.rsplit_once('.').ok_or_else(malformed)?;
        if identity.is_empty() {
            return Err(malformed());
        }
        let issued_at = issued_at.parse::<u64>().map_err(|_| malformed())?;
        let signature = hex::decode(signature_hex).map_err(|_| malformed())?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| ServerError::NotAuthorized("Invalid signature".into()))?;

        if now.saturating_since(Timestamp(issued_at)) > self.config.token_expiry {
            return Err(ServerError::NotAuthorized("Token expired".into()));
        }

        Ok(identity.to_string())
    }

    fn mac(&self) -> ServerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("hmac key: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TokenValidator {
        TokenValidator::new(AuthConfig::new(b"test-secret-key-32-bytes-long!!".to_vec()))
    }

    #[test]
    fn create_and_validate_token() {
        let validator = validator();
        let token = validator.create_token("reader-1").unwrap();
        assert!(token.starts_with("reader-1."));
        assert_eq!(validator.validate_token(&token).unwrap(), "reader-1");
    }

    #[test]
    fn reject_tampered_token() {
        let validator = validator();
        let token = validator.create_token("reader-1").unwrap();

        let forged = token.replacen("reader-1", "reader-2", 1);
        assert!(validator.validate_token(&forged).is_err());

        let mut flipped = token.clone();
        let last = flipped.pop().unwrap();
        flipped.push(if last == '0' { '1' } else { '0' });
        assert!(validator.validate_token(&flipped).is_err());
    }

    #[test]
    fn reject_other_secret() {
        let token = validator().create_token("reader-1").unwrap();
        let other = TokenValidator::new(AuthConfig::new(b"another-secret".to_vec()));
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn reject_expired_token() {
        let validator = TokenValidator::new(
            AuthConfig::new(b"secret".to_vec()).with_expiry(Duration::from_secs(60)),
        );
        let issued = Timestamp(1_700_000_000_000);
        let token = validator.create_token_at("reader-1", issued).unwrap();

        let within = issued.saturating_add(Duration::from_secs(60));
        assert!(validator.validate_token_at(&token, within).is_ok());

        let after = issued.saturating_add(Duration::from_secs(61));
        let err = validator.validate_token_at(&token, after).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn reject_malformed_tokens() {
        let validator = validator();
        for token in ["", "abc", "a.b", ".1.00", "user.notanumber.00", "user.1.zz"] {
            assert!(validator.validate_token(token).is_err(), "{token}");
        }
    }

    #[test]
    fn reject_invalid_identity() {
        let validator = validator();
        assert!(validator.create_token("").is_err());
        assert!(validator.create_token("a.b").is_err());
    }
}
