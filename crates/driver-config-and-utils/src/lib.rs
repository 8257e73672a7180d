//! Core types, configuration, and utilities for the snowlink session core.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    CredentialStoreKind, DriverConfig, PoolConfig, SsoConfig, DEFAULT_BROWSER_TIMEOUT_SECS,
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_LOG_LEVEL, DEFAULT_POOL_MAX_SIZE,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_json, parse_level};
pub use paths::{Paths, CREDENTIAL_CACHE_DIR_ENV, CREDENTIAL_CACHE_FILE_NAME};
