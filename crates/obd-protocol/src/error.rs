//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur while talking to an OBD-II adapter
#[derive(Debug, Clone, Error)]
pub enum ObdError {
    /// Serial port or link-level failure
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Timeout waiting for the response sentinel
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// Response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Adapter rejected the command (`?`) or stopped answering
    #[error("OBD adapter not responding")]
    AdapterNotResponding,

    /// No link to the adapter is open
    #[error("Not connected to an OBD-II adapter")]
    NotConnected,

    /// Channel closed while a command was in flight
    #[error("Command channel closed")]
    ChannelClosed,
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}
