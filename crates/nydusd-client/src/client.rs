//! nydusd control client.
//!
//! A typed client over the daemon's HTTP API: query status, mount and
//! unmount RAFS instances in a shared daemon, bind and unbind fscache blobs,
//! and read filesystem metrics. One client is bound to one socket path for
//! its whole life and can be shared across tasks.

use std::path::{Path, PathBuf};
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, USER_AGENT};
use hyper::{Method, Request, StatusCode};
use nydusd_config::{ClientConfig, DaemonConfig, ReadinessConfig, TransportConfig, daemon};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::BoxFuture;
use crate::build_info;
use crate::error::{ClientError, daemon_error};
use crate::transport::{HttpClient, build_transport};
use crate::types::*;

/// Placeholder origin; the transport routes by socket path, not host.
const BASE_URL: &str = "http://unix";

const ENDPOINT_DAEMON_INFO: &str = "/api/v1/daemon";
const ENDPOINT_MOUNT: &str = "/api/v1/mount";
const ENDPOINT_METRICS: &str = "/api/v1/metrics";
const ENDPOINT_BLOBS: &str = "/api/v2/blobs";

const CONTENT_TYPE_JSON: &str = "application/json";

/// The control operations, each with its own success condition.
///
/// Mutations succeed only on `204 No Content`, while a metrics query that
/// gets `204` has no metrics to decode and counts as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CheckStatus,
    SharedMount,
    Umount,
    FscacheBindBlob,
    FscacheUnbindBlob,
    GetFsMetric,
}

impl Operation {
    pub fn method(self) -> Method {
        match self {
            Operation::CheckStatus | Operation::GetFsMetric => Method::GET,
            Operation::SharedMount => Method::POST,
            Operation::FscacheBindBlob => Method::PUT,
            Operation::Umount | Operation::FscacheUnbindBlob => Method::DELETE,
        }
    }

    /// Whether `status` means the operation succeeded.
    pub fn accepts(self, status: StatusCode) -> bool {
        match self {
            Operation::CheckStatus => status.is_success(),
            Operation::SharedMount => status == StatusCode::NO_CONTENT,
            Operation::Umount => status == StatusCode::NO_CONTENT,
            Operation::FscacheBindBlob => status == StatusCode::NO_CONTENT,
            Operation::FscacheUnbindBlob => status == StatusCode::NO_CONTENT,
            Operation::GetFsMetric => status.is_success() && status != StatusCode::NO_CONTENT,
        }
    }
}

/// Characters that would end a query value early or start a fragment.
const QUERY_DELIMITERS: [char; 3] = ['#', '?', '&'];

/// Append `name=value` to `endpoint`, inserting `value` verbatim.
///
/// A value containing a query delimiter would address a different target,
/// so it is rejected before anything is sent.
fn query_url(endpoint: &str, name: &str, value: &str) -> Result<String, ClientError> {
    let url = format!("{BASE_URL}{endpoint}?{name}={value}");
    if let Some(c) = value.chars().find(|c| QUERY_DELIMITERS.contains(c)) {
        return Err(ClientError::InvalidRequest {
            url,
            reason: format!("{name} must not contain {c:?}"),
        });
    }
    Ok(url)
}

/// `/api/v1/mount?mountpoint=<path>`
pub fn mount_url(mountpoint: &str) -> Result<String, ClientError> {
    query_url(ENDPOINT_MOUNT, "mountpoint", mountpoint)
}

/// Unscoped in single-daemon mode, `?id=/<sid>/fs` in shared mode.
pub fn metrics_url(shared_daemon: bool, sid: &str) -> Result<String, ClientError> {
    if shared_daemon {
        query_url(ENDPOINT_METRICS, "id", &format!("/{sid}/fs"))
    } else {
        Ok(format!("{BASE_URL}{ENDPOINT_METRICS}"))
    }
}

/// `/api/v2/blobs?domain_id=<id>`
pub fn unbind_url(domain_id: &str) -> Result<String, ClientError> {
    query_url(ENDPOINT_BLOBS, "domain_id", domain_id)
}

/// A fully drained response.
struct Exchange {
    status: StatusCode,
    body: Bytes,
}

/// Client for one nydusd instance, reached through its control socket.
#[derive(Debug)]
pub struct NydusdClient {
    socket_path: PathBuf,
    http: HttpClient,
    request_timeout: Duration,
}

impl NydusdClient {
    /// Connect with default readiness and transport settings.
    pub async fn new(socket_path: impl Into<PathBuf>) -> Result<Self, ClientError> {
        Self::with_config(
            socket_path,
            &ReadinessConfig::default(),
            &TransportConfig::default(),
        )
        .await
    }

    /// Connect to the socket named in `config`.
    pub async fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::with_config(
            config.daemon.socket_path.clone(),
            &config.readiness,
            &config.transport,
        )
        .await
    }

    /// Wait for the socket, then build the pooled transport.
    pub async fn with_config(
        socket_path: impl Into<PathBuf>,
        readiness: &ReadinessConfig,
        transport: &TransportConfig,
    ) -> Result<Self, ClientError> {
        let socket_path = socket_path.into();
        let http = build_transport(&socket_path, readiness, transport)
            .await
            .map_err(|source| ClientError::NotReady {
                path: socket_path.clone(),
                attempts: readiness.max_attempts,
                source,
            })?;

        Ok(Self {
            socket_path,
            http,
            request_timeout: transport.request_timeout(),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request and drain the whole response body.
    ///
    /// The body is collected before the status is inspected so the pooled
    /// connection is released on every path.
    async fn exchange(
        &self,
        op: Operation,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<Exchange, ClientError> {
        let method = op.method();

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(url)
            .header(USER_AGENT, build_info::user_agent());
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, CONTENT_TYPE_JSON);
        }
        let req = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| ClientError::InvalidRequest {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        debug!(?op, %method, url, "nydusd request");

        let round_trip = async {
            let resp = self
                .http
                .request(req)
                .await
                .map_err(|source| ClientError::Transport {
                    method: method.clone(),
                    url: url.to_string(),
                    source,
                })?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|source| ClientError::Body {
                    url: url.to_string(),
                    source,
                })?
                .to_bytes();
            Ok::<_, ClientError>(Exchange { status, body })
        };

        let exchange = tokio::time::timeout(self.request_timeout, round_trip)
            .await
            .map_err(|_| ClientError::Timeout {
                method: method.clone(),
                url: url.to_string(),
                timeout: self.request_timeout,
            })??;

        debug!(?op, url, status = exchange.status.as_u16(), "nydusd response");
        Ok(exchange)
    }

    /// Run a mutation whose only success signal is its status code.
    async fn mutate(
        &self,
        op: Operation,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<(), ClientError> {
        let exchange = self.exchange(op, url, body).await?;
        if op.accepts(exchange.status) {
            return Ok(());
        }
        Err(daemon_error(&op.method(), exchange.status, &exchange.body, url))
    }

    fn decode<T: DeserializeOwned>(
        what: &'static str,
        url: &str,
        body: &[u8],
    ) -> Result<T, ClientError> {
        serde_json::from_slice(body).map_err(|source| ClientError::Decode {
            what,
            url: url.to_string(),
            source,
        })
    }

    // ── Typed API methods ──────────────────────────────────────────────

    /// Query the daemon's identity, build info, and state.
    pub async fn check_status(&self) -> Result<DaemonInfo, ClientError> {
        let url = format!("{BASE_URL}{ENDPOINT_DAEMON_INFO}");
        let op = Operation::CheckStatus;
        let exchange = self.exchange(op, &url, None).await?;
        if !op.accepts(exchange.status) {
            return Err(daemon_error(&op.method(), exchange.status, &exchange.body, &url));
        }
        Self::decode("DaemonInfo", &url, &exchange.body)
    }

    /// Mount `bootstrap` at `mountpoint` inside a shared daemon.
    ///
    /// The daemon config is read from disk on every call and embedded
    /// verbatim in the request. An unreadable file fails before any request.
    pub async fn shared_mount(
        &self,
        mountpoint: &str,
        bootstrap: &str,
        daemon_config: &Path,
    ) -> Result<(), ClientError> {
        let url = mount_url(mountpoint)?;
        let content = daemon::read_raw(daemon_config).await?;
        let req = MountRequest::new(bootstrap, String::from_utf8_lossy(&content));
        let body = serde_json::to_vec(&req).map_err(|source| ClientError::Encode {
            what: "MountRequest",
            source,
        })?;
        self.mutate(Operation::SharedMount, &url, Some(Bytes::from(body)))
            .await
    }

    /// Unmount the instance at `mountpoint`.
    pub async fn umount(&self, mountpoint: &str) -> Result<(), ClientError> {
        let url = mount_url(mountpoint)?;
        self.mutate(Operation::Umount, &url, None).await
    }

    /// Bind the blob described by `daemon_config` into the fscache.
    ///
    /// The file content is sent as the request body unchanged.
    pub async fn fscache_bind_blob(&self, daemon_config: &Path) -> Result<(), ClientError> {
        info!(config = %daemon_config.display(), "requesting daemon to bind fscache blob");
        let content = daemon::read_raw(daemon_config).await?;
        let url = format!("{BASE_URL}{ENDPOINT_BLOBS}");
        self.mutate(Operation::FscacheBindBlob, &url, Some(Bytes::from(content)))
            .await
    }

    /// Unbind every blob in the domain named by `daemon_config`.
    pub async fn fscache_unbind_blob(&self, daemon_config: &Path) -> Result<(), ClientError> {
        let cfg = DaemonConfig::load(daemon_config).await?;
        let url = unbind_url(&cfg.domain_id)?;
        info!(domain_id = %cfg.domain_id, "requesting daemon to unbind fscache blobs");
        self.mutate(Operation::FscacheUnbindBlob, &url, None).await
    }

    /// Read filesystem metrics, scoped to mount `sid` when the daemon is
    /// shared.
    pub async fn get_fs_metric(
        &self,
        shared_daemon: bool,
        sid: &str,
    ) -> Result<FsMetric, ClientError> {
        let url = metrics_url(shared_daemon, sid)?;
        let exchange = self.exchange(Operation::GetFsMetric, &url, None).await?;
        if exchange.status == StatusCode::NO_CONTENT {
            return Err(ClientError::UnexpectedStatus {
                url,
                status: exchange.status.as_u16(),
            });
        }
        if !Operation::GetFsMetric.accepts(exchange.status) {
            return Err(daemon_error(
                &Operation::GetFsMetric.method(),
                exchange.status,
                &exchange.body,
                &url,
            ));
        }
        Self::decode("FsMetric", &url, &exchange.body)
    }
}

/// The control operations as an object-safe trait, so orchestration code
/// can hold a `dyn DaemonControl` and tests can substitute a fake daemon.
pub trait DaemonControl: Send + Sync {
    fn check_status(&self) -> BoxFuture<'_, Result<DaemonInfo, ClientError>>;

    fn shared_mount<'a>(
        &'a self,
        mountpoint: &'a str,
        bootstrap: &'a str,
        daemon_config: &'a Path,
    ) -> BoxFuture<'a, Result<(), ClientError>>;

    fn umount<'a>(&'a self, mountpoint: &'a str) -> BoxFuture<'a, Result<(), ClientError>>;

    fn fscache_bind_blob<'a>(
        &'a self,
        daemon_config: &'a Path,
    ) -> BoxFuture<'a, Result<(), ClientError>>;

    fn fscache_unbind_blob<'a>(
        &'a self,
        daemon_config: &'a Path,
    ) -> BoxFuture<'a, Result<(), ClientError>>;

    fn get_fs_metric<'a>(
        &'a self,
        shared_daemon: bool,
        sid: &'a str,
    ) -> BoxFuture<'a, Result<FsMetric, ClientError>>;
}

impl DaemonControl for NydusdClient {
    fn check_status(&self) -> BoxFuture<'_, Result<DaemonInfo, ClientError>> {
        Box::pin(NydusdClient::check_status(self))
    }

    fn shared_mount<'a>(
        &'a self,
        mountpoint: &'a str,
        bootstrap: &'a str,
        daemon_config: &'a Path,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(NydusdClient::shared_mount(
            self,
            mountpoint,
            bootstrap,
            daemon_config,
        ))
    }

    fn umount<'a>(&'a self, mountpoint: &'a str) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(NydusdClient::umount(self, mountpoint))
    }

    fn fscache_bind_blob<'a>(
        &'a self,
        daemon_config: &'a Path,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(NydusdClient::fscache_bind_blob(self, daemon_config))
    }

    fn fscache_unbind_blob<'a>(
        &'a self,
        daemon_config: &'a Path,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(NydusdClient::fscache_unbind_blob(self, daemon_config))
    }

    fn get_fs_metric<'a>(
        &'a self,
        shared_daemon: bool,
        sid: &'a str,
    ) -> BoxFuture<'a, Result<FsMetric, ClientError>> {
        Box::pin(NydusdClient::get_fs_metric(self, shared_daemon, sid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mutations_succeed_only_on_no_content() {
        for op in [
            Operation::SharedMount,
            Operation::Umount,
            Operation::FscacheBindBlob,
            Operation::FscacheUnbindBlob,
        ] {
            assert!(op.accepts(StatusCode::NO_CONTENT), "{op:?}");
            assert!(!op.accepts(StatusCode::OK), "{op:?}");
            assert!(!op.accepts(StatusCode::CONFLICT), "{op:?}");
        }
    }

    #[test]
    fn test_metrics_reject_no_content() {
        assert!(Operation::GetFsMetric.accepts(StatusCode::OK));
        assert!(!Operation::GetFsMetric.accepts(StatusCode::NO_CONTENT));
        assert!(!Operation::GetFsMetric.accepts(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_status_accepts_any_success() {
        assert!(Operation::CheckStatus.accepts(StatusCode::OK));
        assert!(!Operation::CheckStatus.accepts(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn test_operation_methods() {
        assert_eq!(Operation::CheckStatus.method(), Method::GET);
        assert_eq!(Operation::SharedMount.method(), Method::POST);
        assert_eq!(Operation::Umount.method(), Method::DELETE);
        assert_eq!(Operation::FscacheBindBlob.method(), Method::PUT);
        assert_eq!(Operation::FscacheUnbindBlob.method(), Method::DELETE);
        assert_eq!(Operation::GetFsMetric.method(), Method::GET);
    }

    #[test]
    fn test_urls() {
        assert_eq!(
            mount_url("/mnt/nydus/snap-1").unwrap(),
            "http://unix/api/v1/mount?mountpoint=/mnt/nydus/snap-1"
        );
        assert_eq!(
            metrics_url(false, "ignored").unwrap(),
            "http://unix/api/v1/metrics"
        );
        assert_eq!(
            metrics_url(true, "snap-1").unwrap(),
            "http://unix/api/v1/metrics?id=/snap-1/fs"
        );
        assert_eq!(
            unbind_url("domain-a").unwrap(),
            "http://unix/api/v2/blobs?domain_id=domain-a"
        );
    }

    #[test]
    fn test_query_values_with_delimiters_are_rejected() {
        for bad in ["/mnt/a#snap2", "/mnt/a?x=1", "/mnt/a&mountpoint=/mnt/b"] {
            let err = mount_url(bad).unwrap_err();
            assert!(
                matches!(err, ClientError::InvalidRequest { .. }),
                "{bad}: {err:?}"
            );
            assert!(err.is_local());
        }
        assert!(matches!(
            unbind_url("d1#frag"),
            Err(ClientError::InvalidRequest { .. })
        ));
        assert!(matches!(
            unbind_url("d1&domain_id=d2"),
            Err(ClientError::InvalidRequest { .. })
        ));
        assert!(matches!(
            metrics_url(true, "snap#1"),
            Err(ClientError::InvalidRequest { .. })
        ));
        assert!(matches!(
            metrics_url(true, "snap?1"),
            Err(ClientError::InvalidRequest { .. })
        ));
        // Unscoped metrics never carry the sid.
        assert!(metrics_url(false, "snap#1").is_ok());
    }
}
