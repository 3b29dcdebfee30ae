//! VAG Diagnostic Protocol
//!
//! Establishes CAN addressing to the engine ECU (11-bit, falling back to
//! 29-bit), opens the extended diagnostic session and reads the DPF
//! measuring blocks. When the extended readout fails the session falls back
//! to generic OBD-II Mode 06 / Mode 01 requests.

mod addressing;
mod blocks;
mod data;
mod error;
mod session;

pub use addressing::Addressing;
pub use blocks::{
    decode_distance, decode_regen_status, decode_soot_mass, decode_temperature_pair,
    MeasuringBlock,
};
pub use data::{DpfData, ReadoutMode};
pub use error::ReadoutError;
pub use regen_detector::{DetectorConfig, RegenPhase};
pub use session::{TemperaturePair, VagSession};

/// UDS service constants
pub mod service {
    /// DiagnosticSessionControl
    pub const DIAGNOSTIC_SESSION_CONTROL: u8 = 0x10;
    /// Extended diagnostic session sub-function
    pub const EXTENDED_SESSION: u8 = 0x03;
    /// ReadDataByIdentifier
    pub const READ_DATA_BY_IDENTIFIER: u8 = 0x22;
    /// Offset added to the service id in a positive response
    pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;
    /// Start extended diagnostic session request
    pub const START_DIAGNOSTIC_SESSION: &str = "1003";
    /// Positive reply to [`START_DIAGNOSTIC_SESSION`]
    pub const SESSION_STARTED: &str = "5003";
}
