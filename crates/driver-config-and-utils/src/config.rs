//! Driver configuration.

use crate::{CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default number of idle sessions kept per connection identity.
pub const DEFAULT_POOL_MAX_SIZE: usize = 10;

/// Default idle lifetime of a pooled session, in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 3600;

/// Default wait for the browser SSO callback, in seconds.
pub const DEFAULT_BROWSER_TIMEOUT_SECS: u64 = 120;

/// Which credential store backs the token cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStoreKind {
    /// Native vault where the platform has one, in-memory elsewhere.
    #[default]
    Default,
    /// Volatile process-lifetime store.
    Memory,
    /// Permission-hardened JSON file.
    File,
    /// Platform credential vault.
    Native,
}

/// Session pool defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum idle sessions per connection identity.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Seconds an idle session may wait before eviction.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Whether released sessions are retained at all.
    #[serde(default = "default_true")]
    pub pooling_enabled: bool,
}

impl PoolConfig {
    /// Idle timeout as a `Duration`.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_MAX_SIZE,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            pooling_enabled: true,
        }
    }
}

/// Browser single-sign-on settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoConfig {
    /// How long to wait for the identity provider redirect.
    #[serde(default = "default_browser_timeout_secs")]
    pub browser_response_timeout_secs: u64,
    /// Millisecond override of `browser_response_timeout_secs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_response_timeout_ms: Option<u64>,
    /// Ask the server for the SSO URL instead of building a console-login URL.
    #[serde(default = "default_true")]
    pub disable_console_login: bool,
    /// Persist the identity token returned by login in the credential store.
    #[serde(default = "default_true")]
    pub client_store_temporary_credential: bool,
}

impl SsoConfig {
    /// Callback timeout as a `Duration`. The millisecond field wins when set.
    pub fn browser_response_timeout(&self) -> Duration {
        match self.browser_response_timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(self.browser_response_timeout_secs),
        }
    }
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            browser_response_timeout_secs: DEFAULT_BROWSER_TIMEOUT_SECS,
            browser_response_timeout_ms: None,
            disable_console_login: true,
            client_store_temporary_credential: true,
        }
    }
}

/// Top-level driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Session pool defaults.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Browser SSO settings.
    #[serde(default)]
    pub sso: SsoConfig,
    /// Credential store selection.
    #[serde(default)]
    pub credential_store: CredentialStoreKind,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_max_size() -> usize {
    DEFAULT_POOL_MAX_SIZE
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_browser_timeout_secs() -> u64 {
    DEFAULT_BROWSER_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            pool: PoolConfig::default(),
            sso: SsoConfig::default(),
            credential_store: CredentialStoreKind::default(),
        }
    }
}

impl DriverConfig {
    /// Create a new config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    /// Environment variables are applied last.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DriverConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from `SNOWLINK_*` environment variables.
    /// Unparseable values are ignored with a warning.
    fn load_from_env(&mut self) {
        if let Some(log_level) = env_value("SNOWLINK_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(max_size) = env_parsed::<usize>("SNOWLINK_POOL_MAX_SIZE") {
            self.pool.max_size = max_size;
        }
        if let Some(secs) = env_parsed::<u64>("SNOWLINK_POOL_IDLE_TIMEOUT_SECS") {
            self.pool.idle_timeout_secs = secs;
        }
        if let Some(enabled) = env_parsed::<bool>("SNOWLINK_POOLING_ENABLED") {
            self.pool.pooling_enabled = enabled;
        }
        if let Some(secs) = env_parsed::<u64>("SNOWLINK_BROWSER_TIMEOUT_SECS") {
            self.sso.browser_response_timeout_secs = secs;
        }
        if let Some(ms) = env_parsed::<u64>("SNOWLINK_BROWSER_TIMEOUT_MS") {
            self.sso.browser_response_timeout_ms = Some(ms);
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    let raw = std::env::var(name).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_value(name)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}
