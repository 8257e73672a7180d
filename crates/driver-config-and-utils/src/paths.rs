//! File system paths for the session core.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Environment variable selecting the directory of the file-backed credential cache.
pub const CREDENTIAL_CACHE_DIR_ENV: &str = "SNOWLINK_CREDENTIAL_CACHE_DIR";

/// File name of the credential cache inside its directory.
pub const CREDENTIAL_CACHE_FILE_NAME: &str = "temporary_credential.json";

/// Manages file system paths for the driver.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for driver files (~/.snowlink)
    base_dir: PathBuf,
    /// Explicit credential cache directory, taking precedence over the environment.
    credential_cache_dir: Option<PathBuf>,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.snowlink`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".snowlink"),
            credential_cache_dir: None,
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            credential_cache_dir: None,
        }
    }

    /// Pin the credential cache directory, ignoring the environment override.
    pub fn with_credential_cache_dir(mut self, dir: PathBuf) -> Self {
        self.credential_cache_dir = Some(dir);
        self
    }

    /// Get the base directory (~/.snowlink).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.snowlink/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the logs directory (~/.snowlink/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Directory holding the credential cache file.
    ///
    /// Resolution order: explicit directory, `SNOWLINK_CREDENTIAL_CACHE_DIR`,
    /// then the base directory.
    pub fn credential_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.credential_cache_dir {
            return dir.clone();
        }
        std::env::var(CREDENTIAL_CACHE_DIR_ENV)
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.base_dir.clone())
    }

    /// Full path of the credential cache file.
    pub fn credential_cache_file(&self) -> PathBuf {
        self.credential_cache_dir().join(CREDENTIAL_CACHE_FILE_NAME)
    }

    /// Ensure the base and logs directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
