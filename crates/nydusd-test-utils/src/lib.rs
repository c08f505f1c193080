#![deny(unsafe_code)]

//! Shared test utilities for the nydusd client workspace.
//!
//! Provides a scriptable mock daemon serving HTTP on a temporary Unix
//! socket, config builders, and tracing helpers so that individual crate
//! tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! nydusd-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod mock_daemon;
pub mod tracing_setup;

pub use mock_daemon::{MockDaemon, MockResponse, RecordedRequest};
