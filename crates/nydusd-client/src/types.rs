//! Request/response payloads of the nydusd HTTP API.
//!
//! Field names follow the daemon's JSON exactly; they are part of the
//! compatibility surface.

use serde::{Deserialize, Serialize};

/// Filesystem type requested on mount.
pub const FS_TYPE_RAFS: &str = "rafs";

/// Build information reported by the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildTimeInfo {
    pub package_ver: String,
    pub git_commit: String,
    pub build_time: String,
    pub profile: String,
    pub rustc: String,
}

/// Response of `GET /api/v1/daemon`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonInfo {
    pub id: String,
    pub version: BuildTimeInfo,
    pub state: String,
}

impl DaemonInfo {
    /// The reported state, parsed.
    pub fn state(&self) -> DaemonState {
        DaemonState::from(self.state.as_str())
    }

    /// Whether the daemon reports it is serving filesystems.
    pub fn is_running(&self) -> bool {
        self.state() == DaemonState::Running
    }
}

/// Lifecycle state reported by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Init,
    Ready,
    Running,
    Unknown,
}

impl From<&str> for DaemonState {
    fn from(s: &str) -> Self {
        match s {
            "INIT" => DaemonState::Init,
            "READY" => DaemonState::Ready,
            "RUNNING" => DaemonState::Running,
            _ => DaemonState::Unknown,
        }
    }
}

/// Response of `GET /api/v1/metrics`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsMetric {
    pub files_account_enabled: bool,
    pub access_pattern_enabled: bool,
    pub measure_latency: bool,
    pub id: String,
    pub data_read: u64,
    pub block_count_read: Vec<u64>,
    pub fop_hits: Vec<u64>,
    pub fop_errors: Vec<u64>,
    pub fop_cumulative_latency_total: Vec<u64>,
    pub read_latency_dist: Vec<u64>,
    pub nr_opens: u64,
}

/// Body of `POST /api/v1/mount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRequest {
    pub fs_type: String,
    /// Bootstrap path.
    pub source: String,
    /// Raw content of the daemon configuration file.
    pub config: String,
}

impl MountRequest {
    pub fn new(bootstrap: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            fs_type: FS_TYPE_RAFS.to_string(),
            source: bootstrap.into(),
            config: config.into(),
        }
    }
}

/// Error body returned by the daemon on failure.
///
/// Missing fields decode as empty strings; a body that is not a JSON object
/// fails to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
}
