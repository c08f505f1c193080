//! Configuration builders and fixtures for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`ClientConfig`] values
//! without repeating boilerplate across crate boundaries.

use std::path::{Path, PathBuf};

use nydusd_config::ClientConfig;

/// Fluent builder for [`ClientConfig`] in tests.
///
/// Starts from the defaults with a short readiness budget so tests that
/// expect the socket to be missing fail fast.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .socket_path(daemon.socket_path())
///     .shared()
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: ClientConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = ClientConfig::default();
        config.readiness.max_attempts = 5;
        config.readiness.interval_ms = 10;
        Self { config }
    }

    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.daemon.socket_path = path.into();
        self
    }

    pub fn shared(mut self) -> Self {
        self.config.daemon.mode = nydusd_config::DAEMON_MODE_SHARED.to_string();
        self
    }

    pub fn fscache(mut self) -> Self {
        self.config.daemon.fs_driver = nydusd_config::FS_DRIVER_FSCACHE.to_string();
        self
    }

    pub fn daemon_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.daemon.config_path = Some(path.into());
        self
    }

    pub fn readiness(mut self, max_attempts: u32, interval_ms: u64) -> Self {
        self.config.readiness.max_attempts = max_attempts;
        self.config.readiness.interval_ms = interval_ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.transport.request_timeout_secs = secs;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Write a daemon configuration file into `dir` and return its path.
pub fn write_daemon_config(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("failed to write daemon config");
    path
}

/// A minimal fscache daemon configuration for `domain_id`.
pub fn fscache_daemon_config(domain_id: &str) -> String {
    serde_json::json!({
        "type": "bootstrap",
        "id": "blob-0001",
        "domain_id": domain_id,
        "config": {
            "id": "blob-0001",
            "backend_type": "registry",
            "backend_config": {"host": "registry.local", "repo": "library/busybox"},
            "cache_type": "fscache",
        },
    })
    .to_string()
}
