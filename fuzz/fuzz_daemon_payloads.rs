//! Fuzz target for JSON the client reads from disk or from the daemon:
//! daemon config files, status and metrics responses, and error bodies.
//!
//! Run with: cargo +nightly fuzz run fuzz_daemon_payloads

#![no_main]

use libfuzzer_sys::fuzz_target;
use nydusd_client::{DaemonInfo, ErrorMessage, FsMetric};

fuzz_target!(|data: &[u8]| {
    let _ = nydusd_config::DaemonConfig::from_slice(data);
    if let Ok(info) = serde_json::from_slice::<DaemonInfo>(data) {
        let _ = info.state();
    }
    let _ = serde_json::from_slice::<FsMetric>(data);
    let _ = serde_json::from_slice::<ErrorMessage>(data);
});
