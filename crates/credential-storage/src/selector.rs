//! Selection of the active credential store.
//!
//! `CredentialStoreSelector` is a plain value that can be constructed and
//! threaded through session setup; `global_selector()` is the process-wide
//! instance for callers that do not inject one.

use crate::{CredentialStore, InMemoryCredentialStore, StorageError, StorageResult};
use driver_config_and_utils::{CredentialStoreKind, Paths};
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Holds an optional explicit store; falls back to platform default resolution.
#[derive(Default)]
pub struct CredentialStoreSelector {
    active: RwLock<Option<Arc<dyn CredentialStore>>>,
}

impl CredentialStoreSelector {
    /// Selector with no override, resolving to the platform default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector pinned to `store`.
    pub fn with_store(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            active: RwLock::new(Some(store)),
        }
    }

    /// Override the active store. Visible to every later `get_active` call.
    pub fn set_active(&self, store: Arc<dyn CredentialStore>) {
        debug!(store = store.name(), "Setting active credential store");
        *self.active.write() = Some(store);
    }

    /// Drop any override and resolve to the platform default from now on.
    pub fn use_default(&self) -> Arc<dyn CredentialStore> {
        *self.active.write() = None;
        default_store()
    }

    /// The explicit override if set, else the platform default.
    pub fn get_active(&self) -> Arc<dyn CredentialStore> {
        if let Some(store) = self.active.read().as_ref() {
            return store.clone();
        }
        default_store()
    }

    /// Whether an explicit store has been set.
    pub fn has_override(&self) -> bool {
        self.active.read().is_some()
    }
}

/// The process-wide selector.
pub fn global_selector() -> &'static CredentialStoreSelector {
    static GLOBAL: OnceLock<CredentialStoreSelector> = OnceLock::new();
    GLOBAL.get_or_init(CredentialStoreSelector::new)
}

/// The platform's native credential vault.
pub fn native_store() -> StorageResult<Arc<dyn CredentialStore>> {
    #[cfg(target_os = "macos")]
    {
        let store = crate::macos::KeychainCredentialStore::new(crate::SERVICE_NAME)?;
        Ok(Arc::new(store))
    }

    #[cfg(target_os = "windows")]
    {
        let store = crate::windows::WindowsCredentialStore::new(crate::SERVICE_NAME)?;
        Ok(Arc::new(store))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Err(StorageError::Platform(
            "No native credential vault available for this platform".to_string(),
        ))
    }
}

/// Native vault where the platform has one, the shared in-memory store otherwise.
pub fn default_store() -> Arc<dyn CredentialStore> {
    if cfg!(any(target_os = "macos", target_os = "windows")) {
        match native_store() {
            Ok(store) => return store,
            Err(e) => warn!(error = %e, "Native credential vault unavailable, using memory"),
        }
    }
    InMemoryCredentialStore::shared()
}

/// Build the store named by configuration.
pub fn store_for_kind(
    kind: CredentialStoreKind,
    paths: &Paths,
) -> StorageResult<Arc<dyn CredentialStore>> {
    match kind {
        CredentialStoreKind::Default => Ok(default_store()),
        CredentialStoreKind::Memory => Ok(InMemoryCredentialStore::shared()),
        CredentialStoreKind::Native => native_store(),
        CredentialStoreKind::File => file_store(paths),
    }
}

#[cfg(unix)]
fn file_store(paths: &Paths) -> StorageResult<Arc<dyn CredentialStore>> {
    Ok(Arc::new(crate::FileCredentialStore::from_paths(paths)))
}

#[cfg(not(unix))]
fn file_store(_paths: &Paths) -> StorageResult<Arc<dyn CredentialStore>> {
    Err(StorageError::Platform(
        "The file credential store is only available on Unix platforms".to_string(),
    ))
}
