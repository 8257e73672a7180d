//! Windows Credential Vault credential store.

use crate::{hash_key, CredentialStore, StorageError, StorageResult};
use tracing::{debug, warn};
use windows::{
    core::HSTRING,
    Security::Credentials::{PasswordCredential, PasswordVault},
};

/// `ERROR_NOT_FOUND` as an HRESULT.
const HRESULT_NOT_FOUND: u32 = 0x8007_0490;

/// Credential Vault backed store. Entries use `resource_name` as the resource
/// and the hashed key as the user name.
pub struct WindowsCredentialStore {
    resource_name: String,
}

impl WindowsCredentialStore {
    /// Create a new store, failing if the vault cannot be opened.
    pub fn new(resource_name: &str) -> StorageResult<Self> {
        PasswordVault::new().map_err(|e| {
            StorageError::Platform(format!("Failed to access Credential Vault: {}", e))
        })?;

        Ok(Self {
            resource_name: resource_name.to_string(),
        })
    }

    fn vault(&self) -> StorageResult<PasswordVault> {
        PasswordVault::new()
            .map_err(|e| StorageError::Platform(format!("Failed to access Credential Vault: {}", e)))
    }

    fn is_not_found(e: &windows::core::Error) -> bool {
        e.code().0 as u32 == HRESULT_NOT_FOUND
    }
}

impl CredentialStore for WindowsCredentialStore {
    fn save(&self, key: &str, secret: &str) -> StorageResult<()> {
        let hashed = hash_key(key);
        debug!(resource = %self.resource_name, key = %hashed, "Saving credential");

        let vault = self.vault()?;
        let resource = HSTRING::from(&self.resource_name);
        let user_name = HSTRING::from(&hashed);

        if let Ok(existing) = vault.Retrieve(&resource, &user_name) {
            let _ = vault.Remove(&existing);
        }

        let added = PasswordCredential::CreatePasswordCredential(
            &resource,
            &user_name,
            &HSTRING::from(secret),
        )
        .and_then(|credential| vault.Add(&credential));

        if let Err(e) = added {
            warn!(key = %hashed, error = %e, "Failed to save credential");
        }
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let hashed = hash_key(key);
        debug!(resource = %self.resource_name, key = %hashed, "Getting credential");

        let vault = self.vault()?;
        let resource = HSTRING::from(&self.resource_name);
        let user_name = HSTRING::from(&hashed);

        match vault.Retrieve(&resource, &user_name) {
            Ok(credential) => {
                // RetrievePassword populates the Password field
                credential.RetrievePassword().map_err(|e| {
                    StorageError::Platform(format!("Failed to retrieve password: {}", e))
                })?;
                let password = credential
                    .Password()
                    .map_err(|e| StorageError::Platform(format!("Failed to get password: {}", e)))?;
                Ok(Some(password.to_string()))
            }
            Err(e) if Self::is_not_found(&e) => Ok(None),
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to retrieve credential: {}",
                e
            ))),
        }
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let hashed = hash_key(key);
        debug!(resource = %self.resource_name, key = %hashed, "Removing credential");

        let vault = self.vault()?;
        let resource = HSTRING::from(&self.resource_name);
        let user_name = HSTRING::from(&hashed);

        match vault.Retrieve(&resource, &user_name) {
            Ok(credential) => match vault.Remove(&credential) {
                Ok(()) => Ok(true),
                Err(e) => {
                    warn!(key = %hashed, error = %e, "Failed to remove credential");
                    Ok(false)
                }
            },
            Err(e) if Self::is_not_found(&e) => Ok(false),
            Err(e) => {
                warn!(key = %hashed, error = %e, "Failed to look up credential for removal");
                Ok(false)
            }
        }
    }

    fn name(&self) -> &'static str {
        "windows-credential-vault"
    }
}
