#![deny(unsafe_code)]

//! Configuration loading and validation for the nydusd control client.
//!
//! Loads TOML configuration files describing where the daemon's control
//! socket lives, how long to wait for it, and how the HTTP transport is
//! tuned. Provides [`ClientConfig`] as the central configuration structure,
//! and the [`daemon`] module for the nydusd JSON configuration the client
//! forwards to the daemon.

/// nydusd daemon configuration (JSON) as seen by the client.
pub mod daemon;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use daemon::{DaemonConfig, DaemonConfigError};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Daemon working mode: one daemon per image.
pub const DAEMON_MODE_MULTIPLE: &str = "multiple";
/// Daemon working mode: a single daemon serving every mount.
pub const DAEMON_MODE_SHARED: &str = "shared";
/// Daemon working mode: no daemon, images are consumed directly.
pub const DAEMON_MODE_NONE: &str = "none";

/// Filesystem driver backed by FUSE.
pub const FS_DRIVER_FUSEDEV: &str = "fusedev";
/// Filesystem driver backed by the kernel fscache subsystem.
pub const FS_DRIVER_FSCACHE: &str = "fscache";

/// Top-level client configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Target daemon.
    #[serde(default)]
    pub daemon: DaemonSection,

    /// Socket readiness wait policy.
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// HTTP transport tuning.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the daemon is and how it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSection {
    /// Path of the daemon's HTTP control socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Daemon working mode: "multiple", "shared", or "none".
    #[serde(default = "default_daemon_mode")]
    pub mode: String,

    /// Filesystem driver: "fusedev" or "fscache".
    #[serde(default = "default_fs_driver")]
    pub fs_driver: String,

    /// Path to the nydusd JSON configuration forwarded on mount and blob bind.
    #[serde(default)]
    pub config_path: Option<PathBuf>,
}

impl DaemonSection {
    /// Whether one daemon serves many mounts, which scopes metric queries.
    pub fn is_shared(&self) -> bool {
        self.mode == DAEMON_MODE_SHARED
    }

    /// Whether blobs are served through fscache.
    pub fn is_fscache(&self) -> bool {
        self.fs_driver == FS_DRIVER_FSCACHE
    }
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            mode: default_daemon_mode(),
            fs_driver: default_fs_driver(),
            config_path: None,
        }
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/containerd-nydus/nydusd.sock")
}

fn default_daemon_mode() -> String {
    DAEMON_MODE_MULTIPLE.to_string()
}

fn default_fs_driver() -> String {
    FS_DRIVER_FUSEDEV.to_string()
}

/// How long to wait for the daemon to create its control socket.
///
/// The wait polls at a constant interval. With the defaults the worst case
/// is roughly two seconds, which covers a normal daemon startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Number of stat attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Upper bound of a random delay added to each interval (0 = none).
    #[serde(default)]
    pub jitter_ms: u64,
}

impl ReadinessConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
            jitter_ms: 0,
        }
    }
}

fn default_max_attempts() -> u32 {
    20
}

fn default_interval_ms() -> u64 {
    100
}

/// Connection pool and timeout settings for the control channel.
///
/// Tuned for a local, low-latency, low-concurrency socket rather than a
/// general-purpose HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Overall deadline for one request, including reading the body.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deadline for dialing the socket.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Maximum idle connections kept in the pool.
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle: usize,

    /// How long an idle pooled connection is kept.
    #[serde(default = "default_pool_idle_timeout_secs")]
    pub pool_idle_timeout_secs: u64,
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            pool_max_idle: default_pool_max_idle(),
            pool_idle_timeout_secs: default_pool_idle_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_pool_max_idle() -> usize {
    10
}

fn default_pool_idle_timeout_secs() -> u64 {
    10
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ClientConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading client config");
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "daemon.socket_path must not be empty".to_string(),
            ));
        }
        let valid_modes = [DAEMON_MODE_MULTIPLE, DAEMON_MODE_SHARED, DAEMON_MODE_NONE];
        if !valid_modes.contains(&self.daemon.mode.as_str()) {
            return Err(ConfigError::Validation(format!(
                "daemon.mode must be one of {:?}, got {:?}",
                valid_modes, self.daemon.mode
            )));
        }
        let valid_drivers = [FS_DRIVER_FUSEDEV, FS_DRIVER_FSCACHE];
        if !valid_drivers.contains(&self.daemon.fs_driver.as_str()) {
            return Err(ConfigError::Validation(format!(
                "daemon.fs_driver must be one of {:?}, got {:?}",
                valid_drivers, self.daemon.fs_driver
            )));
        }

        if self.readiness.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "readiness.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.transport.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "transport.request_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.transport.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "transport.connect_timeout_secs must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
