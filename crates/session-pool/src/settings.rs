//! Registry-wide pool defaults.

use driver_config_and_utils::PoolConfig;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Global pool settings shared by every pool of one registry.
///
/// Changes are picked up by each pool on its next acquire or release; pools
/// with a per-pool override ignore the corresponding global value.
#[derive(Debug)]
pub struct PoolSettings {
    max_size: AtomicUsize,
    idle_timeout_ms: AtomicU64,
    pooling_enabled: AtomicBool,
}

impl PoolSettings {
    pub fn new(max_size: usize, idle_timeout: Duration, pooling_enabled: bool) -> Self {
        Self {
            max_size: AtomicUsize::new(max_size),
            idle_timeout_ms: AtomicU64::new(duration_to_ms(idle_timeout)),
            pooling_enabled: AtomicBool::new(pooling_enabled),
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.max_size, config.idle_timeout(), config.pooling_enabled)
    }

    pub fn max_size(&self) -> usize {
        self.max_size.load(Ordering::Acquire)
    }

    /// A maximum of zero means released sessions are never kept.
    pub fn set_max_size(&self, max_size: usize) {
        self.max_size.store(max_size, Ordering::Release);
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.load(Ordering::Acquire))
    }

    pub fn set_idle_timeout(&self, idle_timeout: Duration) {
        self.idle_timeout_ms
            .store(duration_to_ms(idle_timeout), Ordering::Release);
    }

    pub fn pooling_enabled(&self) -> bool {
        self.pooling_enabled.load(Ordering::Acquire)
    }

    pub fn set_pooling_enabled(&self, enabled: bool) {
        self.pooling_enabled.store(enabled, Ordering::Release);
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from_config(&PoolConfig::default())
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_pool_config() {
        let settings = PoolSettings::default();
        let config = PoolConfig::default();
        assert_eq!(settings.max_size(), config.max_size);
        assert_eq!(settings.idle_timeout(), config.idle_timeout());
        assert!(settings.pooling_enabled());
    }

    #[test]
    fn test_setters() {
        let settings = PoolSettings::default();
        settings.set_max_size(3);
        settings.set_idle_timeout(Duration::from_millis(250));
        settings.set_pooling_enabled(false);

        assert_eq!(settings.max_size(), 3);
        assert_eq!(settings.idle_timeout(), Duration::from_millis(250));
        assert!(!settings.pooling_enabled());
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let settings = PoolSettings::new(1, Duration::MAX, true);
        assert_eq!(settings.idle_timeout(), Duration::from_millis(u64::MAX));
    }
}
