//! Error types for ember-llm

use thiserror::Error;

/// Result type alias using ember-llm Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the model server
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response
    #[error("server error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Request was cancelled by the caller
    #[error("request aborted")]
    Aborted,

    /// Unexpected response format
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// Create a server error from a status code and body text
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is transient (worth retrying)
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) | Error::Timeout => true,
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_timeout() {
        assert!(Error::Timeout.is_transient());
    }

    #[test]
    fn test_transient_server_errors() {
        assert!(Error::api(500, "internal").is_transient());
        assert!(Error::api(503, "loading model").is_transient());
        assert!(Error::api(429, "busy").is_transient());
    }

    #[test]
    fn test_not_transient_client_errors() {
        assert!(!Error::api(400, "bad request").is_transient());
        assert!(!Error::api(404, "model not found").is_transient());
    }

    #[test]
    fn test_not_transient_aborted() {
        assert!(!Error::Aborted.is_transient());
        assert!(!Error::UnexpectedResponse("empty body".into()).is_transient());
    }
}
