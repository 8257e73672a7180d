//! Connection identity -> pool map.

use crate::{PoolSettings, PoolStats, PooledSession, SessionPool};
use driver_config_and_utils::PoolConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Owns every session pool of a process.
///
/// Pools are created lazily on first use and only dropped by [`clear_all`].
/// The map lock is held only to look up or insert pools; acquire and release
/// run under each pool's own lock.
///
/// [`clear_all`]: PoolRegistry::clear_all
pub struct PoolRegistry<S: PooledSession> {
    settings: Arc<PoolSettings>,
    pools: RwLock<HashMap<String, Arc<SessionPool<S>>>>,
}

impl<S: PooledSession> PoolRegistry<S> {
    /// Registry with the default pool configuration.
    pub fn new() -> Self {
        Self::with_settings(PoolSettings::default())
    }

    pub fn with_config(config: &PoolConfig) -> Self {
        Self::with_settings(PoolSettings::from_config(config))
    }

    pub fn with_settings(settings: PoolSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Global settings shared by all pools.
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Pool for `identity`, created on first request.
    pub fn get_pool(&self, identity: &str) -> Arc<SessionPool<S>> {
        if let Some(pool) = self.pools.read().get(identity) {
            return Arc::clone(pool);
        }

        let mut pools = self.pools.write();
        let pool = pools.entry(identity.to_string()).or_insert_with(|| {
            // Identities can embed credentials, so they are not logged.
            info!("Creating session pool");
            Arc::new(SessionPool::new(identity, Arc::clone(&self.settings)))
        });
        Arc::clone(pool)
    }

    /// Pool for `identity` if one exists. Never creates.
    pub fn existing_pool(&self, identity: &str) -> Option<Arc<SessionPool<S>>> {
        self.pools.read().get(identity).cloned()
    }

    /// Take an idle session for `identity`, if any.
    pub fn try_acquire(&self, identity: &str) -> Option<S> {
        self.get_pool(identity).try_acquire()
    }

    /// Return a session. With no pool for `identity` (e.g. after
    /// [`clear_all`](Self::clear_all)) the session is closed.
    pub fn release(&self, identity: &str, session: S) {
        match self.existing_pool(identity) {
            Some(pool) => pool.release(session),
            None => {
                debug!("No pool for released session, closing it");
                session.close();
            }
        }
    }

    /// Reuse an idle session for `identity` or establish one with `connect`.
    pub async fn acquire_or_connect<F, Fut, E>(&self, identity: &str, connect: F) -> Result<S, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, E>>,
    {
        if let Some(session) = self.try_acquire(identity) {
            return Ok(session);
        }
        debug!("No idle session, establishing a new one");
        connect().await
    }

    /// Drop every pool, closing its idle sessions.
    ///
    /// Sessions checked out at this point are closed when released.
    pub fn clear_all(&self) {
        let pools = std::mem::take(&mut *self.pools.write());
        info!(pools = pools.len(), "Clearing all session pools");
        for pool in pools.into_values() {
            pool.retire();
        }
    }

    /// Enable or disable pooling for every pool without an override.
    pub fn set_pooling_enabled(&self, enabled: bool) {
        self.settings.set_pooling_enabled(enabled);
    }

    /// Enable or disable pooling for one identity.
    pub fn set_pooling_enabled_for(&self, identity: &str, enabled: bool) {
        self.get_pool(identity).set_pooling(enabled);
    }

    pub fn set_max_size(&self, max_size: usize) {
        self.settings.set_max_size(max_size);
    }

    pub fn set_idle_timeout(&self, idle_timeout: Duration) {
        self.settings.set_idle_timeout(idle_timeout);
    }

    pub fn pooling_enabled(&self) -> bool {
        self.settings.pooling_enabled()
    }

    pub fn max_size(&self) -> usize {
        self.settings.max_size()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.settings.idle_timeout()
    }

    /// Idle sessions pooled for `identity`.
    pub fn current_size(&self, identity: &str) -> usize {
        self.existing_pool(identity)
            .map(|pool| pool.current_size())
            .unwrap_or(0)
    }

    /// Idle sessions across all pools.
    pub fn total_size(&self) -> usize {
        self.pools
            .read()
            .values()
            .map(|pool| pool.current_size())
            .sum()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    pub fn stats(&self, identity: &str) -> Option<PoolStats> {
        self.existing_pool(identity).map(|pool| pool.stats())
    }
}

impl<S: PooledSession> Default for PoolRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
