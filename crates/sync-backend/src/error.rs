//! Backend error types.

use thiserror::Error;

/// Errors returned by search backend clients.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Socket-level failure reaching the backend
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request did not complete in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Backend reported a server-side failure
    #[error("Transport error (HTTP {status}): {body}")]
    Transport { status: u16, body: String },

    /// Backend rejected the request
    #[error("Request error (HTTP {status}): {body}")]
    Request { status: u16, body: String },

    /// Response could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Client misconfiguration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackendError {
    /// Whether retrying the same call may succeed.
    ///
    /// Network failures and any error status reported by the backend are
    /// transient. Malformed responses and client misconfiguration are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Connection(_)
                | BackendError::Timeout(_)
                | BackendError::Transport { .. }
                | BackendError::Request { .. }
        )
    }

    /// Classify an HTTP error status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        if (400..500).contains(&status) {
            BackendError::Request {
                status,
                body: body.into(),
            }
        } else {
            BackendError::Transport {
                status,
                body: body.into(),
            }
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(err.to_string())
        } else if err.is_decode() {
            BackendError::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            BackendError::Config(err.to_string())
        } else if let Some(status) = err.status() {
            BackendError::from_status(status.as_u16(), err.to_string())
        } else {
            BackendError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Connection("refused".into()).is_transient());
        assert!(BackendError::Timeout("30s".into()).is_transient());
        assert!(BackendError::from_status(503, "unavailable").is_transient());
        assert!(BackendError::from_status(400, "bad mapping").is_transient());
        assert!(!BackendError::InvalidResponse("not json".into()).is_transient());
        assert!(!BackendError::Config("no url".into()).is_transient());
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            BackendError::from_status(404, "missing"),
            BackendError::Request { status: 404, .. }
        ));
        assert!(matches!(
            BackendError::from_status(500, "boom"),
            BackendError::Transport { status: 500, .. }
        ));
    }

    #[test]
    fn test_error_display() {
        let err = BackendError::from_status(502, "bad gateway");
        assert_eq!(err.to_string(), "Transport error (HTTP 502): bad gateway");
    }
}
