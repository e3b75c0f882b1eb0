//! Error types shared across the bridge
//!
//! Collaborator crates (mesh transports, Matrix client, persistence) carry
//! their own error enums; this is the vocabulary of the core itself.

use thiserror::Error;

/// Main error type for bridge-core operations
#[derive(Error, Debug)]
pub enum MeshlinkError {
    // ===== Identifier Errors =====
    /// Invalid node id format
    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    /// Invalid packet id format
    #[error("Invalid packet id: {0}")]
    InvalidPacketId(String),

    // ===== Configuration Errors =====
    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // ===== General Errors =====
    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeshlinkError {
    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            MeshlinkError::InvalidNodeId(_) => "INVALID_NODE_ID",
            MeshlinkError::InvalidPacketId(_) => "INVALID_PACKET_ID",
            MeshlinkError::InvalidConfig(_) => "INVALID_CONFIG",
            MeshlinkError::MissingConfig(_) => "MISSING_CONFIG",
            MeshlinkError::Serialization(_) => "SERIALIZATION_ERROR",
            MeshlinkError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for MeshlinkError {
    fn from(err: serde_json::Error) -> Self {
        MeshlinkError::Serialization(err.to_string())
    }
}

/// Result type alias for bridge-core operations
pub type Result<T> = std::result::Result<T, MeshlinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = MeshlinkError::InvalidNodeId("wat".to_string());
        assert_eq!(err.error_code(), "INVALID_NODE_ID");
        let err = MeshlinkError::MissingConfig("MATRIX_ROOM".to_string());
        assert_eq!(err.error_code(), "MISSING_CONFIG");
    }

    #[test]
    fn test_display() {
        let err = MeshlinkError::MissingConfig("MATRIX_ROOM".to_string());
        assert_eq!(
            err.to_string(),
            "Missing required configuration: MATRIX_ROOM"
        );
    }
}
