//! Socket readiness wait.
//!
//! The daemon creates its control socket some time after the process is
//! spawned. Before the client builds its transport it polls the socket path
//! until it exists and is a socket, at a constant interval, for a bounded
//! number of attempts. Intermediate failures are discarded; only the last
//! observed condition is reported.

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nydusd_config::ReadinessConfig;
use rand::Rng;
use tracing::{debug, info, warn};

/// Why a socket path is not (yet) usable.
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("file {path} is not socket file")]
    NotSocket { path: PathBuf },
}

/// Check once whether `path` exists and is a Unix socket.
pub async fn check_socket(path: &Path) -> Result<(), WaitError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|source| WaitError::Stat {
            path: path.to_path_buf(),
            source,
        })?;

    if !meta.file_type().is_socket() {
        return Err(WaitError::NotSocket {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Poll `path` until it is a socket or `policy.max_attempts` checks failed.
///
/// Both a failed stat and a non-socket entry are retried, since the daemon
/// may be midway through creating the socket. On exhaustion the error from
/// the final attempt is returned.
pub async fn wait_until_socket_exists(
    path: &Path,
    policy: &ReadinessConfig,
) -> Result<(), WaitError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match check_socket(path).await {
            Ok(()) => {
                info!(path = %path.display(), attempt, "daemon socket ready");
                return Ok(());
            }
            Err(e) if attempt >= max_attempts => {
                warn!(
                    path = %path.display(),
                    attempts = attempt,
                    error = %e,
                    "daemon socket never became ready"
                );
                return Err(e);
            }
            Err(e) => {
                debug!(path = %path.display(), attempt, error = %e, "daemon socket not ready");
            }
        }

        tokio::time::sleep(next_delay(policy)).await;
        attempt += 1;
    }
}

fn next_delay(policy: &ReadinessConfig) -> Duration {
    let jitter = policy.jitter();
    if jitter.is_zero() {
        return policy.interval();
    }
    policy.interval() + rand::rng().random_range(Duration::ZERO..=jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    fn fast_policy(max_attempts: u32) -> ReadinessConfig {
        ReadinessConfig {
            max_attempts,
            interval_ms: 10,
            jitter_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_existing_socket_is_ready_immediately() {
        let tmp = TempDir::new().unwrap();
        let sock = tmp.path().join("api.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&sock).unwrap();

        let started = Instant::now();
        wait_until_socket_exists(&sock, &ReadinessConfig::default())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_missing_path_reports_stat_error() {
        let tmp = TempDir::new().unwrap();
        let sock = tmp.path().join("absent.sock");

        let err = wait_until_socket_exists(&sock, &fast_policy(3))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Stat { .. }));
        assert!(err.to_string().contains("absent.sock"));
    }

    #[tokio::test]
    async fn test_regular_file_reports_not_socket() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain");
        std::fs::write(&path, "not a socket").unwrap();

        let err = wait_until_socket_exists(&path, &fast_policy(3))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::NotSocket { .. }));
        assert!(err.to_string().contains("is not socket file"));
    }

    #[tokio::test]
    async fn test_only_last_error_is_surfaced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("late");

        // Absent for the first attempts, a regular file afterwards.
        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tokio::fs::write(&writer_path, "x").await.unwrap();
        });

        let err = wait_until_socket_exists(&path, &fast_policy(15))
            .await
            .unwrap_err();
        writer.await.unwrap();
        assert!(matches!(err, WaitError::NotSocket { .. }));
    }

    #[tokio::test]
    async fn test_socket_created_late_is_picked_up() {
        let tmp = TempDir::new().unwrap();
        let sock = tmp.path().join("late.sock");

        let bind_path = sock.clone();
        let binder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            tokio::net::UnixListener::bind(&bind_path).unwrap()
        });

        wait_until_socket_exists(&sock, &ReadinessConfig::default())
            .await
            .unwrap();
        let _listener = binder.await.unwrap();
    }

    #[tokio::test]
    async fn test_default_budget_is_about_two_seconds() {
        let tmp = TempDir::new().unwrap();
        let sock = tmp.path().join("never.sock");

        let started = Instant::now();
        let result = wait_until_socket_exists(&sock, &ReadinessConfig::default()).await;
        let elapsed = started.elapsed();

        assert!(result.is_err());
        // 20 attempts with 19 sleeps of 100ms in between.
        assert!(elapsed >= Duration::from_millis(1900), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_single_attempt_does_not_sleep() {
        let tmp = TempDir::new().unwrap();
        let sock = tmp.path().join("never.sock");
        let policy = ReadinessConfig {
            max_attempts: 1,
            interval_ms: 5_000,
            jitter_ms: 0,
        };

        let started = Instant::now();
        assert!(wait_until_socket_exists(&sock, &policy).await.is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = ReadinessConfig {
            max_attempts: 3,
            interval_ms: 100,
            jitter_ms: 20,
        };
        for _ in 0..50 {
            let d = next_delay(&policy);
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(120));
        }
        assert_eq!(next_delay(&fast_policy(1)), Duration::from_millis(10));
    }
}
