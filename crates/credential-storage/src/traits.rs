//! Credential store trait.

use crate::StorageResult;

/// Durable or volatile key -> secret storage.
///
/// Implementations hash `key` before use. Absence is `Ok(None)`, never an error.
pub trait CredentialStore: Send + Sync {
    /// Store `secret` under `key`, overwriting any previous value.
    fn save(&self, key: &str, secret: &str) -> StorageResult<()>;

    /// Retrieve the secret stored under `key`.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete the secret stored under `key`. Returns whether anything was removed.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Check if a secret exists for `key`.
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;
}
