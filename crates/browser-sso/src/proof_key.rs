//! Single-use proof key binding one SSO attempt to its callback.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use std::fmt;

/// Number of random bytes in a proof key.
const PROOF_KEY_BYTES: usize = 32;

/// Base64 encoded random value sent with the login request.
#[derive(Clone, PartialEq, Eq)]
pub struct ProofKey(String);

impl ProofKey {
    /// Generate a fresh key from 32 random bytes.
    pub fn generate() -> Self {
        let mut bytes = [0u8; PROOF_KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(BASE64.encode(bytes))
    }

    /// Wrap a key issued by the server.
    pub fn from_server(value: String) -> Self {
        Self(value)
    }

    /// The encoded key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProofKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProofKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_32_bytes_base64() {
        let key = ProofKey::generate();
        let decoded = BASE64.decode(key.as_str()).unwrap();
        assert_eq!(decoded.len(), 32);
        assert_eq!(key.as_str().len(), 44);
    }

    #[test]
    fn test_generate_is_unique() {
        assert_ne!(ProofKey::generate(), ProofKey::generate());
    }

    #[test]
    fn test_debug_hides_value() {
        let key = ProofKey::from_server("server-proof".to_string());
        assert!(!format!("{:?}", key).contains("server-proof"));
    }
}
