//! Error types for the Matrix collaborator

use thiserror::Error;

/// Main error type for Matrix operations
#[derive(Error, Debug)]
pub enum MatrixError {
    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The homeserver answered with a non-success status
    #[error("Homeserver returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (usually a Matrix error JSON)
        body: String,
    },

    /// Login or token validation failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A room alias could not be resolved
    #[error("Could not resolve room {0}")]
    RoomNotFound(String),

    /// The homeserver answered with something unexpected
    #[error("Unexpected response: {0}")]
    BadResponse(String),

    /// The event channel to the bridge closed
    #[error("Bridge channel closed")]
    ChannelClosed,
}

impl MatrixError {
    /// Whether the operation may succeed if retried after a delay.
    ///
    /// Server errors and rate limits are transient; auth and client errors
    /// are not.
    pub fn is_retriable(&self) -> bool {
        match self {
            MatrixError::Http(_) => true,
            MatrixError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type alias for Matrix operations
pub type Result<T> = std::result::Result<T, MatrixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retriable() {
        assert!(MatrixError::Status {
            status: 502,
            body: String::new()
        }
        .is_retriable());
        assert!(MatrixError::Status {
            status: 429,
            body: String::new()
        }
        .is_retriable());
        assert!(!MatrixError::Status {
            status: 403,
            body: String::new()
        }
        .is_retriable());
        assert!(!MatrixError::Auth("bad password".to_string()).is_retriable());
    }
}
