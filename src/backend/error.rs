//! Error types for the remote backend client.

use thiserror::Error;

/// Errors that can occur when talking to the chat backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// URL assembly error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Backend reachable but returned a non-success status.
    #[error("{endpoint} returned status {status}")]
    Rejected {
        /// HTTP status code of the response.
        status: reqwest::StatusCode,
        /// The endpoint that rejected the request.
        endpoint: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded, retry after {0} seconds")]
    RateLimited(u64),

    /// Credentials rejected or session no longer valid.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Login rejected by the backend.
    #[error("Login failed for {0}")]
    LoginFailed(String),

    /// The backend expects a numeric identifier in request bodies.
    #[error("Identifier is not numeric: {0}")]
    InvalidId(String),

    /// Response body could not be decoded.
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Upload payload could not be assembled.
    #[error("Upload payload error: {0}")]
    UploadPayload(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackendError {
    /// Whether the failure is connectivity-class (request never got a
    /// server verdict) as opposed to a backend rejection.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::HttpRequest(_))
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
