//! Error types for concierge-api

use thiserror::Error;

/// Result type alias using concierge-api Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a backend service
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed before a response arrived
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Service answered with a non-success status
    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    /// Token endpoint answered 2xx without a usable access token
    #[error("Malformed token response: {0}")]
    MalformedToken(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from a status code and detail message
    pub fn api(status: u16, detail: impl Into<String>) -> Self {
        Self::Api {
            status,
            detail: detail.into(),
        }
    }

    /// HTTP status of the failed response, if the service answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this error is worth retrying for an idempotent read
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Api { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Check if the service rejected the bearer credential
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// The provider's own message, without the variant prefix
    pub fn detail(&self) -> String {
        match self {
            Error::Api { detail, .. } => detail.clone(),
            Error::MalformedToken(detail) | Error::InvalidConfig(detail) => detail.clone(),
            Error::Http(e) => e.to_string(),
            Error::Json(e) => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_server_errors() {
        assert!(Error::api(500, "boom").is_retryable());
        assert!(Error::api(503, "unavailable").is_retryable());
        assert!(Error::api(429, "slow down").is_retryable());
    }

    #[test]
    fn test_not_retryable_client_errors() {
        assert!(!Error::api(400, "bad request").is_retryable());
        assert!(!Error::api(401, "expired").is_retryable());
        assert!(!Error::api(409, "Room is already booked").is_retryable());
        assert!(!Error::MalformedToken("missing access_token".into()).is_retryable());
    }

    #[test]
    fn test_unauthorized() {
        assert!(Error::api(401, "Could not validate credentials").is_unauthorized());
        assert!(!Error::api(403, "Not enough permissions").is_unauthorized());
        assert!(!Error::InvalidConfig("x".into()).is_unauthorized());
    }

    #[test]
    fn test_detail_strips_prefix() {
        let e = Error::api(409, "Room is already booked for the selected dates");
        assert_eq!(e.detail(), "Room is already booked for the selected dates");
        assert_eq!(
            e.to_string(),
            "API error (409): Room is already booked for the selected dates"
        );
    }
}
