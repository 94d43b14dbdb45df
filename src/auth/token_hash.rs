// Refresh token hashing and redaction

use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 of a refresh token (64-character hex string)
///
/// Only this value is persisted, so a leaked table cannot be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenHash(String);

impl TokenHash {
    pub fn from_token(token: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Refresh token wrapper with redacted formatting
pub struct RefreshToken(Secret<String>);

impl RefreshToken {
    pub fn new(token: &str) -> Self {
        Self(Secret::new(token.to_string()))
    }

    pub fn hash(&self) -> TokenHash {
        TokenHash::from_token(self.expose_secret())
    }

    /// Expose the raw token (use with caution)
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshToken")
            .field("token", &"<REDACTED>")
            .finish()
    }
}
