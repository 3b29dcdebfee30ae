//! Readout Error Types

use obd_protocol::ObdError;
use thiserror::Error;

/// Reasons the extended measuring-block readout was abandoned
#[derive(Debug, Error)]
pub enum ReadoutError {
    /// The adapter link failed mid-readout
    #[error("transport failure: {0}")]
    Transport(#[from] ObdError),

    /// The ECU answered none of the measuring blocks
    #[error("no DPF measuring block is supported by this ECU")]
    NoBlocksSupported,
}
