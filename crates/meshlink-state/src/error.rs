//! Error types for the persistence layer

use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Error, Debug)]
pub enum StateError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Connection/open error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// A persisted snapshot could not be decoded
    #[error("Corrupt snapshot for packet {packet_id}: {reason}")]
    CorruptSnapshot {
        /// The packet whose snapshot failed to decode
        packet_id: i64,
        /// Decode failure detail
        reason: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StateError {
    fn from(err: sqlx::Error) -> Self {
        StateError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

impl From<StateError> for meshlink_core::MeshlinkError {
    fn from(err: StateError) -> Self {
        meshlink_core::MeshlinkError::Internal(err.to_string())
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StateError>;
