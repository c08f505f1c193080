#![deny(unsafe_code)]

//! Control-plane client for the nydusd filesystem daemon.
//!
//! The daemon exposes an HTTP/JSON API on a Unix domain socket. This crate
//! waits for that socket to appear, keeps a pooled HTTP/1.1 transport bound
//! to it, and maps each control call's response (including the daemon's own
//! `{code, message}` errors) into [`ClientError`].
//!
//! ```text
//! ┌──────────────┐   wait for socket   ┌──────────────────┐
//! │ orchestrator │────────────────────▶│ /run/.../api.sock│
//! │              │  HTTP/1.1 + JSON    │     nydusd       │
//! │ NydusdClient │────────────────────▶│                  │
//! └──────────────┘                     └──────────────────┘
//! ```

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future, used where async methods have
/// to stay object-safe (`dyn DaemonControl`) or name their future type
/// (the socket connector).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Typed control operations.
pub mod client;
/// Client error taxonomy and daemon error mapping.
pub mod error;
/// Lazily built, shared clients keyed by socket path.
pub mod registry;
/// Unix-socket connector and pooled HTTP transport.
pub mod transport;
/// Daemon API payloads.
pub mod types;
/// Socket readiness polling.
pub mod wait;

pub use client::{DaemonControl, NydusdClient, Operation};
pub use error::ClientError;
pub use registry::ClientRegistry;
pub use types::{DaemonInfo, DaemonState, ErrorMessage, FsMetric, MountRequest};
pub use wait::{WaitError, wait_until_socket_exists};
