//! Environment override behaviour. Kept in its own test binary so the
//! process environment is not shared with the unit tests.

use driver_config_and_utils::{DriverConfig, Paths, CREDENTIAL_CACHE_DIR_ENV};
use std::path::PathBuf;

#[test]
fn environment_overrides_file_and_cache_dir() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::with_base_dir(dir.path().to_path_buf());

    let mut config = DriverConfig::default();
    config.pool.max_size = 4;
    config.save(&paths).unwrap();

    std::env::set_var("SNOWLINK_POOL_MAX_SIZE", "7");
    std::env::set_var("SNOWLINK_POOLING_ENABLED", "false");
    std::env::set_var("SNOWLINK_BROWSER_TIMEOUT_SECS", "not-a-number");
    std::env::set_var(CREDENTIAL_CACHE_DIR_ENV, "/var/tmp/snowlink-cache");

    let loaded = DriverConfig::load(&paths).unwrap();
    assert_eq!(loaded.pool.max_size, 7);
    assert!(!loaded.pool.pooling_enabled);
    assert_eq!(loaded.sso.browser_response_timeout_secs, 120);

    assert_eq!(
        paths.credential_cache_dir(),
        PathBuf::from("/var/tmp/snowlink-cache")
    );

    std::env::set_var(CREDENTIAL_CACHE_DIR_ENV, "   ");
    assert_eq!(paths.credential_cache_dir(), dir.path().to_path_buf());

    for name in [
        "SNOWLINK_POOL_MAX_SIZE",
        "SNOWLINK_POOLING_ENABLED",
        "SNOWLINK_BROWSER_TIMEOUT_SECS",
        CREDENTIAL_CACHE_DIR_ENV,
    ] {
        std::env::remove_var(name);
    }
}
