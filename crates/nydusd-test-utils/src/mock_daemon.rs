//! A scriptable stand-in for nydusd's HTTP API.
//!
//! [`MockDaemon`] serves an axum router on a Unix socket. Every request is
//! recorded; responses are looked up by method and path-and-query, so a
//! test can script `DELETE /api/v2/blobs?domain_id=d1` separately from other
//! blob calls. Unscripted requests get a `404` with a daemon-style error
//! body.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// One request as the mock daemon saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    /// Path plus query, e.g. `/api/v1/mount?mountpoint=/mnt/a`.
    pub uri: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// The body parsed as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is not JSON")
    }
}

/// A scripted response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    body: String,
    delay: Duration,
}

impl MockResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    /// `204 No Content` with an empty body.
    pub fn no_content() -> Self {
        Self::new(204, "")
    }

    /// `200 OK` with a JSON body.
    pub fn ok_json(body: serde_json::Value) -> Self {
        Self::new(200, body.to_string())
    }

    /// A daemon error body `{code, message}` with the given status.
    pub fn error(status: u16, code: &str, message: &str) -> Self {
        Self::new(
            status,
            serde_json::json!({ "code": code, "message": message }).to_string(),
        )
    }

    /// Hold the response back for `delay` before sending it.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<(String, String), MockResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// A mock daemon listening on a Unix socket.
///
/// The server task is stopped when this value is dropped.
pub struct MockDaemon {
    socket_path: PathBuf,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
    _temp_dir: Option<TempDir>,
}

impl MockDaemon {
    /// Start a mock daemon on a socket inside a fresh temp directory.
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("api.sock");
        let mut daemon = Self::bind(&socket_path).await;
        daemon._temp_dir = Some(temp_dir);
        daemon
    }

    /// Start a mock daemon on an explicit socket path.
    pub async fn bind(socket_path: &Path) -> Self {
        let listener = UnixListener::bind(socket_path).expect("failed to bind mock daemon socket");
        let state = Arc::new(MockState::default());
        let app = axum::Router::new()
            .fallback(handle_any)
            .with_state(Arc::clone(&state));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        debug!(path = %socket_path.display(), "mock daemon listening");
        Self {
            socket_path: socket_path.to_path_buf(),
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
            _temp_dir: None,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Script the response for `method` on `path_and_query`.
    pub fn respond(&self, method: &str, path_and_query: &str, response: MockResponse) {
        self.state
            .routes
            .lock()
            .expect("mock routes poisoned")
            .insert((method.to_string(), path_and_query.to_string()), response);
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .expect("mock requests poisoned")
            .clone()
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

async fn handle_any(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    state
        .requests
        .lock()
        .expect("mock requests poisoned")
        .push(RecordedRequest {
            method: method.to_string(),
            uri: path_and_query.clone(),
            content_type: headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: body.to_vec(),
        });

    let scripted = state
        .routes
        .lock()
        .expect("mock routes poisoned")
        .get(&(method.to_string(), path_and_query.clone()))
        .cloned();

    let response = scripted.unwrap_or_else(|| {
        MockResponse::error(404, "NotFound", &format!("no route for {method} {path_and_query}"))
    });

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status == StatusCode::NO_CONTENT {
        return status.into_response();
    }
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        response.body,
    )
        .into_response()
}
