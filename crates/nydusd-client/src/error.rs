//! Errors returned by the nydusd client.

use std::path::PathBuf;
use std::time::Duration;

use hyper::{Method, StatusCode};
use nydusd_config::DaemonConfigError;

use crate::types::ErrorMessage;
use crate::wait::WaitError;

/// Everything that can go wrong talking to the daemon.
///
/// Variants separate local failures (daemon config unreadable or
/// unparseable, socket never ready) from transport failures, malformed
/// responses, and failures the daemon reported itself.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("daemon socket {path} not ready after {attempts} attempts: {source}")]
    NotReady {
        path: PathBuf,
        attempts: u32,
        source: WaitError,
    },

    /// The daemon config file could not be read or parsed. Raised before
    /// any request is sent.
    #[error(transparent)]
    DaemonConfig(#[from] DaemonConfigError),

    #[error("failed to build request for {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("failed to do HTTP {method} to {url}: {source}")]
    Transport {
        method: Method,
        url: String,
        source: hyper_util::client::legacy::Error,
    },

    #[error("HTTP {method} to {url} timed out after {timeout:?}")]
    Timeout {
        method: Method,
        url: String,
        timeout: Duration,
    },

    #[error("failed to read response body from {url}: {source}")]
    Body { url: String, source: hyper::Error },

    #[error("failed to decode {what} from {url}: {source}")]
    Decode {
        what: &'static str,
        url: String,
        source: serde_json::Error,
    },

    #[error(
        "http response: {status}, error code: {code}, error message: {message} ({method} {url})"
    )]
    Daemon {
        method: Method,
        url: String,
        status: u16,
        code: String,
        message: String,
    },

    #[error("got unexpected http status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },
}

impl ClientError {
    /// Whether the failure happened locally, before anything was sent.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ClientError::DaemonConfig(_)
                | ClientError::InvalidRequest { .. }
                | ClientError::Encode { .. }
        )
    }

    /// HTTP status of the response that caused this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Daemon { status, .. } | ClientError::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Turn a failed response into an error.
///
/// The body must decode as an [`ErrorMessage`]; if it does not, the decode
/// failure is returned rather than a made-up message.
pub fn daemon_error(
    method: &Method,
    status: StatusCode,
    body: &[u8],
    url: &str,
) -> ClientError {
    match serde_json::from_slice::<ErrorMessage>(body) {
        Ok(msg) => ClientError::Daemon {
            method: method.clone(),
            url: url.to_string(),
            status: status.as_u16(),
            code: msg.code,
            message: msg.message,
        },
        Err(source) => ClientError::Decode {
            what: "ErrorMessage",
            url: url.to_string(),
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_daemon_error_combines_status_code_and_message() {
        let err = daemon_error(
            &Method::DELETE,
            StatusCode::CONFLICT,
            br#"{"code":"E1","message":"busy"}"#,
            "http://unix/api/v1/mount?mountpoint=/m",
        );
        let text = err.to_string();
        assert!(text.contains("409"));
        assert!(text.contains("E1"));
        assert!(text.contains("busy"));
        assert!(text.contains("http://unix/api/v1/mount?mountpoint=/m"));
        assert_eq!(
            text,
            "http response: 409, error code: E1, error message: busy \
             (DELETE http://unix/api/v1/mount?mountpoint=/m)"
        );
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn test_undecodable_body_surfaces_decode_error() {
        let err = daemon_error(
            &Method::PUT,
            StatusCode::INTERNAL_SERVER_ERROR,
            b"<html>oops</html>",
            "http://unix/api/v2/blobs",
        );
        assert!(matches!(
            err,
            ClientError::Decode {
                what: "ErrorMessage",
                ..
            }
        ));
        assert!(err.to_string().contains("http://unix/api/v2/blobs"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_empty_body_is_a_decode_error() {
        let err = daemon_error(&Method::POST, StatusCode::OK, b"", "http://unix/api/v1/mount");
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[test]
    fn test_is_local() {
        let read = ClientError::DaemonConfig(DaemonConfigError::Read {
            path: PathBuf::from("/etc/nydusd.json"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert!(read.is_local());
        assert!(read.to_string().contains("/etc/nydusd.json"));

        let remote = ClientError::UnexpectedStatus {
            url: "http://unix/api/v1/metrics".to_string(),
            status: 204,
        };
        assert!(!remote.is_local());
    }
}
