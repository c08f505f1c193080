//! The nydusd configuration file, as far as the control client cares.
//!
//! The daemon configuration is owned by whoever launches the daemon. The
//! client forwards it verbatim on mount and blob bind, and only looks inside
//! it to find the fscache `domain_id` when unbinding blobs. Everything else
//! is kept as opaque JSON so a round trip never drops fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Errors reading or parsing a daemon configuration file.
#[derive(Debug, thiserror::Error)]
pub enum DaemonConfigError {
    #[error("failed to get content of daemon config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to unmarshal daemon config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A nydusd JSON configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Blob id, present in fscache configurations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// fscache domain that scopes blob bindings. Empty when absent or null.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub domain_id: String,

    /// All remaining fields, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DaemonConfig {
    /// Parse a configuration from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Read and parse the configuration at `path`.
    ///
    /// The file is read on every call; nothing is cached.
    pub async fn load(path: &Path) -> Result<Self, DaemonConfigError> {
        let content = read_raw(path).await?;
        Self::from_slice(&content).map_err(|source| DaemonConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Read the exact bytes of a daemon configuration file.
pub async fn read_raw(path: &Path) -> Result<Vec<u8>, DaemonConfigError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| DaemonConfigError::Read {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const FSCACHE_CONFIG: &str = r#"{
        "type": "bootstrap",
        "id": "blob-1",
        "domain_id": "domain-a",
        "config": {"id": "blob-1", "backend_type": "registry"}
    }"#;

    #[test]
    fn test_parse_fscache_config() {
        let cfg = DaemonConfig::from_slice(FSCACHE_CONFIG.as_bytes()).unwrap();
        assert_eq!(cfg.domain_id, "domain-a");
        assert_eq!(cfg.id.as_deref(), Some("blob-1"));
        assert_eq!(cfg.extra["type"], "bootstrap");
        assert!(cfg.extra.contains_key("config"));
    }

    #[test]
    fn test_missing_domain_id_defaults_to_empty() {
        let cfg = DaemonConfig::from_slice(br#"{"device": {}, "mode": "direct"}"#).unwrap();
        assert_eq!(cfg.domain_id, "");
        assert_eq!(cfg.id, None);
        assert_eq!(cfg.extra["mode"], "direct");
    }

    #[test]
    fn test_null_domain_id_is_empty() {
        let cfg =
            DaemonConfig::from_slice(br#"{"id": null, "domain_id": null, "mode": "cached"}"#)
                .unwrap();
        assert_eq!(cfg.domain_id, "");
        assert_eq!(cfg.id, None);
        assert_eq!(cfg.extra["mode"], "cached");
    }

    #[test]
    fn test_opaque_fields_survive_round_trip() {
        let cfg = DaemonConfig::from_slice(FSCACHE_CONFIG.as_bytes()).unwrap();
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["config"]["backend_type"], "registry");
        assert_eq!(json["domain_id"], "domain-a");
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(DaemonConfig::from_slice(b"domain_id = 'x'").is_err());
    }

    #[tokio::test]
    async fn test_load_distinguishes_read_and_parse_errors() {
        let tmp = TempDir::new().unwrap();

        let missing = tmp.path().join("missing.json");
        let err = DaemonConfig::load(&missing).await.unwrap_err();
        assert!(matches!(err, DaemonConfigError::Read { .. }));

        let garbage = tmp.path().join("garbage.json");
        tokio::fs::write(&garbage, b"{not json").await.unwrap();
        let err = DaemonConfig::load(&garbage).await.unwrap_err();
        assert!(matches!(err, DaemonConfigError::Parse { .. }));
        assert!(err.to_string().contains("garbage.json"));
    }

    #[tokio::test]
    async fn test_read_raw_returns_exact_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nydusd.json");
        let content = b"{\"device\":{\"backend\":{}},\n  \"trailing\" : 1 }\n";
        tokio::fs::write(&path, content).await.unwrap();

        assert_eq!(read_raw(&path).await.unwrap(), content.to_vec());
    }
}
