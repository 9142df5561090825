//! Client error type.
//!
//! Daemon failures are passed through as [`Error::Api`] with the status code
//! and the daemon's own message. Nothing is retried or reclassified.

use std::time::Duration;

use serde::Deserialize;

/// Errors from daemon calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to docker daemon at {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("docker daemon is not running (socket not found at {0})")]
    NotRunning(std::path::PathBuf),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("request failed: {0}")]
    Request(String),

    #[error("docker daemon returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed stream frame: {0}")]
    Frame(String),

    #[error("daemon reported stream error: {0}")]
    Stream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("configuration error: {0}")]
    Config(#[from] dockline_config::ConfigError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Deserialize)]
struct DaemonMessage {
    message: String,
}

impl Error {
    /// Build an [`Error::Api`] from a non-2xx status and its body.
    ///
    /// The daemon's `{"message": ...}` text is kept verbatim; a body that is
    /// not JSON becomes the message as-is.
    pub(crate) fn from_response(status: u16, body: &[u8]) -> Self {
        let message = match serde_json::from_slice::<DaemonMessage>(body) {
            Ok(m) => m.message,
            Err(_) => String::from_utf8_lossy(body).trim().to_string(),
        };
        Error::Api { status, message }
    }

    /// HTTP status for daemon-reported errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the daemon answered 404.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_json_body() {
        let err = Error::from_response(404, br#"{"message":"No such container: abc"}"#);
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "docker daemon returned 404: No such container: abc"
        );
    }

    #[test]
    fn test_from_plain_body() {
        let err = Error::from_response(500, b"page not found\n");
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "page not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_status_only_for_api_errors() {
        assert_eq!(Error::Frame("x".into()).status(), None);
        assert_eq!(Error::from_response(409, b"{}").status(), Some(409));
    }
}
