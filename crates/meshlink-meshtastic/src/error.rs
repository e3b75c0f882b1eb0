//! Error types for the mesh transports

use thiserror::Error;

/// Main error type for mesh transport operations
#[derive(Error, Debug)]
pub enum MeshtasticError {
    // ===== Connection Errors =====
    /// Connection attempt failed
    #[error("Failed to connect to {addr}: {reason}")]
    ConnectFailed {
        /// Target address
        addr: String,
        /// Failure reason
        reason: String,
    },

    /// The link dropped mid-session
    #[error("Radio connection lost")]
    Disconnected,

    /// An operation needed a connected radio
    #[error("Radio is not connected")]
    NotConnected,

    // ===== Protocol Errors =====
    /// Invalid stream frame
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protobuf decode error
    #[error("Protobuf decode error: {0}")]
    ProtobufDecode(String),

    /// Text payload was not valid UTF-8
    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    // ===== Crypto Errors =====
    /// Channel PSK is not usable
    #[error("Invalid channel PSK: {0}")]
    InvalidPsk(String),

    /// Decryption produced garbage
    #[error("Failed to decrypt packet {packet_id}: {reason}")]
    DecryptFailed {
        /// The packet that failed to decrypt
        packet_id: u32,
        /// Failure detail
        reason: String,
    },

    // ===== MQTT Errors =====
    /// Broker connection error
    #[error("MQTT connection error: {0}")]
    Mqtt(String),

    // ===== General Errors =====
    /// The submission channel to the bridge closed
    #[error("Bridge channel closed")]
    ChannelClosed,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeshtasticError {
    /// Whether retrying after a delay can help
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            MeshtasticError::ConnectFailed { .. }
                | MeshtasticError::Disconnected
                | MeshtasticError::NotConnected
                | MeshtasticError::Mqtt(_)
                | MeshtasticError::Io(_)
        )
    }
}

impl From<prost::DecodeError> for MeshtasticError {
    fn from(err: prost::DecodeError) -> Self {
        MeshtasticError::ProtobufDecode(err.to_string())
    }
}

/// Result type alias for mesh transport operations
pub type Result<T> = std::result::Result<T, MeshtasticError>;
