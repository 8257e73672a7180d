//! Secure credential storage for the snowlink session core.
//!
//! Every store hashes the caller's logical key before it touches storage, so
//! the logical key is never persisted. Available stores:
//! - **In-memory**: volatile, process lifetime, secrets zeroed on drop
//! - **File**: permission-hardened JSON file (Unix)
//! - **macOS**: Keychain Access via `security-framework`
//! - **Windows**: Credential Vault via `windows` crate

mod keys;
mod memory;
mod selector;
mod traits;

#[cfg(unix)]
mod file;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

pub use keys::{hash_key, CredentialKey, TokenType};
pub use memory::InMemoryCredentialStore;
pub use selector::{
    default_store, global_selector, native_store, store_for_kind, CredentialStoreSelector,
};
pub use traits::CredentialStore;

#[cfg(unix)]
pub use file::{FileCredentialStore, FileOps, FileStat, SystemFileOps};

#[cfg(target_os = "macos")]
pub use macos::KeychainCredentialStore;

#[cfg(target_os = "windows")]
pub use windows::WindowsCredentialStore;

use std::path::PathBuf;
use thiserror::Error;

/// Service name used for native vault entries.
pub const SERVICE_NAME: &str = "dev.snowlink.credentials";

/// Ownership or permission problem found on the credential cache file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityViolation {
    /// The file owner is not the effective user of this process.
    #[error("{} is owned by uid {owner}, not by the effective user {expected}", path.display())]
    NotOwnedByUser {
        path: PathBuf,
        owner: u32,
        expected: u32,
    },

    /// The file group is not the effective group of this process.
    #[error("{} is owned by gid {group}, not by the effective group {expected}", path.display())]
    NotOwnedByGroup {
        path: PathBuf,
        group: u32,
        expected: u32,
    },

    /// Group or other users have some access to the file.
    #[error("{} has too broad permissions {mode:o}", path.display())]
    TooBroadPermissions { path: PathBuf, mode: u32 },
}

/// Error type for credential store operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Platform-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The credential cache file could not be created with owner-only permissions
    #[error("Failed to create credential cache file {}: {reason}", path.display())]
    CacheFileCreation { path: PathBuf, reason: String },

    /// The credential cache file failed its ownership or permission check
    #[error("Security violation: {0}")]
    SecurityViolation(#[from] SecurityViolation),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns the security violation carried by this error, if any.
    pub fn security_violation(&self) -> Option<&SecurityViolation> {
        match self {
            StorageError::SecurityViolation(violation) => Some(violation),
            _ => None,
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
