//! Volatile in-memory credential store.

use crate::{hash_key, CredentialStore, StorageResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;
use zeroize::Zeroizing;

/// Process-lifetime credential store.
///
/// Secrets are wrapped in `Zeroizing` so their buffers are wiped when they are
/// overwritten, removed, or the store is dropped.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    entries: RwLock<HashMap<String, Zeroizing<String>>>,
}

impl InMemoryCredentialStore {
    /// Create an independent, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance used by default resolution.
    pub fn shared() -> Arc<InMemoryCredentialStore> {
        static SHARED: OnceLock<Arc<InMemoryCredentialStore>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Number of cached secrets.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no secrets.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for InMemoryCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCredentialStore")
            .field("entries", &self.len())
            .finish()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save(&self, key: &str, secret: &str) -> StorageResult<()> {
        let hashed = hash_key(key);
        debug!(key = %hashed, "Saving credential in memory");
        self.entries
            .write()
            .insert(hashed, Zeroizing::new(secret.to_string()));
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let hashed = hash_key(key);
        debug!(key = %hashed, "Getting credential from memory");
        Ok(self
            .entries
            .read()
            .get(&hashed)
            .map(|secret| secret.as_str().to_string()))
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let hashed = hash_key(key);
        debug!(key = %hashed, "Removing credential from memory");
        Ok(self.entries.write().remove(&hashed).is_some())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_save_get_remove() {
        let store = InMemoryCredentialStore::new();

        store.save("test_key", "test_value").unwrap();
        assert_eq!(store.get("test_key").unwrap(), Some("test_value".to_string()));
        assert!(store.has("test_key").unwrap());
        assert!(!store.has("nonexistent").unwrap());

        assert!(store.remove("test_key").unwrap());
        assert_eq!(store.get("test_key").unwrap(), None);
    }

    #[test]
    fn test_save_overwrites() {
        let store = InMemoryCredentialStore::new();

        store.save("k", "v1").unwrap();
        store.save("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v2".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let store = InMemoryCredentialStore::new();
        store.save("other", "secret").unwrap();

        assert!(!store.remove("missing").unwrap());
        assert!(!store.remove("missing").unwrap());
        assert_eq!(store.get("other").unwrap(), Some("secret".to_string()));
    }

    #[test]
    fn test_logical_key_not_stored() {
        let store = InMemoryCredentialStore::new();
        store.save("plain-logical-key", "secret").unwrap();

        let entries = store.entries.read();
        assert!(!entries.contains_key("plain-logical-key"));
        assert!(entries.contains_key(&hash_key("plain-logical-key")));
    }

    #[test]
    fn test_debug_does_not_leak_secrets() {
        let store = InMemoryCredentialStore::new();
        store.save("k", "super-secret").unwrap();
        assert!(!format!("{:?}", store).contains("super-secret"));
    }

    #[test]
    fn test_shared_instance_is_singleton() {
        let a = InMemoryCredentialStore::shared();
        let b = InMemoryCredentialStore::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_concurrent_saves_to_different_keys() {
        let store = Arc::new(InMemoryCredentialStore::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for j in 0..50 {
                        let key = format!("key-{}-{}", i, j);
                        store.save(&key, &format!("secret-{}", j)).unwrap();
                        assert!(store.get(&key).unwrap().is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 16 * 50);
    }
}
