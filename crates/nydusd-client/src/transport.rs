//! Pooled HTTP/1.1 transport over the daemon's Unix socket.
//!
//! Request URLs carry a placeholder authority (`http://unix/...`) only to
//! satisfy URL syntax. The connector ignores it and always dials the socket
//! path captured at construction, so a transport can never be re-pointed.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use http_body_util::Full;
use hyper::Uri;
use hyper::body::Bytes;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use nydusd_config::{ReadinessConfig, TransportConfig};
use tokio::net::UnixStream;
use tracing::debug;

use crate::BoxFuture;
use crate::wait::{WaitError, wait_until_socket_exists};

/// The pooled client type used for all control requests.
pub type HttpClient = Client<UnixConnector, Full<Bytes>>;

/// Dials one fixed Unix socket, whatever the request URL says.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    socket_path: Arc<PathBuf>,
    connect_timeout: Duration,
}

impl UnixConnector {
    pub fn new(socket_path: impl Into<PathBuf>, connect_timeout: Duration) -> Self {
        Self {
            socket_path: Arc::new(socket_path.into()),
            connect_timeout,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl tower::Service<Uri> for UnixConnector {
    type Response = UnixConnection;
    type Error = io::Error;
    type Future = BoxFuture<'static, Result<UnixConnection, io::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _dst: Uri) -> Self::Future {
        let path = Arc::clone(&self.socket_path);
        let timeout = self.connect_timeout;
        Box::pin(async move {
            debug!(path = %path.display(), "dialing daemon socket");
            let stream = tokio::time::timeout(timeout, UnixStream::connect(path.as_path()))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("dial {} timed out after {timeout:?}", path.display()),
                    )
                })??;
            Ok(UnixConnection(TokioIo::new(stream)))
        })
    }
}

/// A dialed Unix stream, adapted to hyper's I/O traits.
#[derive(Debug)]
pub struct UnixConnection(TokioIo<UnixStream>);

impl Connection for UnixConnection {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl Read for UnixConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl Write for UnixConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}

/// Wait for the socket to become ready, then build a pooled client bound
/// to it.
///
/// This blocks for up to the readiness budget, so build one transport per
/// socket path and share it (see [`ClientRegistry`](crate::ClientRegistry)).
pub async fn build_transport(
    socket_path: &Path,
    readiness: &ReadinessConfig,
    transport: &TransportConfig,
) -> Result<HttpClient, WaitError> {
    wait_until_socket_exists(socket_path, readiness).await?;

    let connector = UnixConnector::new(socket_path, transport.connect_timeout());
    let client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(transport.pool_idle_timeout())
        .pool_max_idle_per_host(transport.pool_max_idle)
        .pool_timer(TokioTimer::new())
        .build(connector);
    Ok(client)
}
