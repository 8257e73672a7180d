//! Session pooling for the snowlink session core.
//!
//! A [`PoolRegistry`] maps connection identities to [`SessionPool`]s. Each pool
//! keeps a bounded stack of idle sessions; callers take one with `try_acquire`
//! or establish a new session themselves, and hand it back with `release`.
//! Nothing in this crate blocks or fails: sessions that cannot be kept are
//! closed.

mod pool;
mod registry;
mod session;
mod settings;

pub use pool::{PoolStats, SessionPool};
pub use registry::PoolRegistry;
pub use session::PooledSession;
pub use settings::PoolSettings;
