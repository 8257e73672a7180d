//! macOS Keychain credential store.

use crate::{hash_key, CredentialStore, StorageError, StorageResult};
use security_framework::passwords::{
    delete_generic_password, get_generic_password, set_generic_password,
};
use tracing::{debug, warn};

/// `errSecItemNotFound`
const ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;

/// Keychain-backed credential store. Entries are generic passwords under
/// `service_name` with the hashed key as the account.
pub struct KeychainCredentialStore {
    service_name: String,
}

impl KeychainCredentialStore {
    /// Create a new Keychain store.
    pub fn new(service_name: &str) -> StorageResult<Self> {
        Ok(Self {
            service_name: service_name.to_string(),
        })
    }
}

impl CredentialStore for KeychainCredentialStore {
    fn save(&self, key: &str, secret: &str) -> StorageResult<()> {
        let hashed = hash_key(key);
        debug!(service = %self.service_name, key = %hashed, "Saving keychain item");

        // Replace rather than update so the item's ACL is reset to this process.
        let _ = delete_generic_password(&self.service_name, &hashed);

        if let Err(e) = set_generic_password(&self.service_name, &hashed, secret.as_bytes()) {
            warn!(key = %hashed, error = %e, "Failed to save keychain item");
        }
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let hashed = hash_key(key);
        debug!(service = %self.service_name, key = %hashed, "Getting keychain item");

        match get_generic_password(&self.service_name, &hashed) {
            Ok(data) => {
                let value =
                    String::from_utf8(data).map_err(|e| StorageError::Encoding(e.to_string()))?;
                Ok(Some(value))
            }
            Err(e) if e.code() == ERR_SEC_ITEM_NOT_FOUND => Ok(None),
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to get keychain item: {}",
                e
            ))),
        }
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let hashed = hash_key(key);
        debug!(service = %self.service_name, key = %hashed, "Removing keychain item");

        match delete_generic_password(&self.service_name, &hashed) {
            Ok(()) => Ok(true),
            Err(e) if e.code() == ERR_SEC_ITEM_NOT_FOUND => Ok(false),
            Err(e) => {
                warn!(key = %hashed, error = %e, "Failed to remove keychain item");
                Ok(false)
            }
        }
    }

    fn name(&self) -> &'static str {
        "keychain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SERVICE: &str = "dev.snowlink.credentials.test";

    #[test]
    #[ignore] // Requires macOS Keychain access
    fn test_keychain_operations() {
        let store = KeychainCredentialStore::new(TEST_SERVICE).unwrap();
        let _ = store.remove("test_key");

        store.save("test_key", "test_value").unwrap();
        assert_eq!(store.get("test_key").unwrap(), Some("test_value".to_string()));

        store.save("test_key", "new_value").unwrap();
        assert_eq!(store.get("test_key").unwrap(), Some("new_value".to_string()));

        assert!(store.remove("test_key").unwrap());
        assert!(!store.remove("test_key").unwrap());
        assert_eq!(store.get("test_key").unwrap(), None);
    }
}
