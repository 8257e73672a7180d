//! Logical credential keys and their hashed storage form.

use sha2::{Digest, Sha256};
use std::fmt;

/// Kind of token cached on behalf of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    /// Identity token returned by browser SSO login.
    IdToken,
    /// Multi-factor authentication token.
    MfaToken,
}

impl TokenType {
    /// Wire name used inside the logical key.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::IdToken => "ID_TOKEN",
            TokenType::MfaToken => "MFATOKEN",
        }
    }
}

/// Logical key `HOST:USER:TOKEN_TYPE` for a cached token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    host: String,
    user: String,
    token_type: TokenType,
}

impl CredentialKey {
    /// Build a key; host and user are compared case-insensitively.
    pub fn new(host: &str, user: &str, token_type: TokenType) -> Self {
        Self {
            host: host.trim().to_uppercase(),
            user: user.trim().to_uppercase(),
            token_type,
        }
    }

    /// Key for the browser SSO identity token.
    pub fn id_token(host: &str, user: &str) -> Self {
        Self::new(host, user, TokenType::IdToken)
    }

    /// The token type this key refers to.
    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    /// Storage form of this key.
    pub fn hashed(&self) -> String {
        hash_key(&self.to_string())
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.user, self.token_type.as_str())
    }
}

/// One-way SHA-256 digest of a logical key, lowercase hex (64 chars).
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
