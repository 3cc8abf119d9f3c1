//! Error type for the WebHDFS client.
//!
//! # Design
//! Every failure that crosses the public boundary is an `ApiError`. Callers
//! that only care about "what went wrong" can use `status_code()` and
//! `message()`; callers that want to branch on the cause match the variants.
//! Non-HTTP failures report status code `0`.

use std::path::Path;

use thiserror::Error;

/// Status code reported for failures that never produced an HTTP response.
pub const NO_STATUS: u16 = 0;

/// Errors returned by `RestTool` and `WebHdfsClient`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The transport could not complete the exchange (DNS, connect, TLS,
    /// timeout, truncated body).
    #[error("network error: {message}")]
    Network { message: String },

    /// The server answered with a status outside `200..300`.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A JSON payload or configuration document could not be (de)serialized.
    #[error("decode failed: {0}")]
    Decode(String),

    /// A local file could not be read.
    #[error("failed to read local file {path}: {message}")]
    LocalIo { path: String, message: String },
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        ApiError::Network {
            message: message.into(),
        }
    }

    pub fn local_io(path: &Path, err: std::io::Error) -> Self {
        ApiError::LocalIo {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// HTTP status of the failed response, or `NO_STATUS` when there was none.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Http { status, .. } => *status,
            _ => NO_STATUS,
        }
    }

    /// Human readable description. For HTTP failures this is the response body.
    pub fn message(&self) -> String {
        match self {
            ApiError::Http { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_exposes_status_and_body() {
        let err = ApiError::Http {
            status: 403,
            body: "Permission denied".to_string(),
        };
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.message(), "Permission denied");
        assert_eq!(err.to_string(), "HTTP 403: Permission denied");
    }

    #[test]
    fn non_http_errors_use_sentinel_status() {
        assert_eq!(ApiError::network("connection refused").status_code(), NO_STATUS);
        assert_eq!(ApiError::Decode("eof".into()).status_code(), NO_STATUS);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = ApiError::local_io(Path::new("/tmp/a.bin"), io);
        assert_eq!(err.status_code(), NO_STATUS);
        assert!(err.message().contains("/tmp/a.bin"));
    }

    #[test]
    fn network_message_is_descriptive() {
        let err = ApiError::network("dns lookup failed");
        assert_eq!(err.message(), "network error: dns lookup failed");
    }
}
