//! Error types for aprilaire-client.

use thiserror::Error;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum AprilaireError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value cannot be represented on the wire.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Protocol error (malformed frame, unknown enum value, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The command queue is closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The thermostat never reported its MAC address.
    #[error("Missing MAC address, cannot identify thermostat")]
    MissingMacAddress,
}

/// Result type alias using AprilaireError.
pub type Result<T> = std::result::Result<T, AprilaireError>;
