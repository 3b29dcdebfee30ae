//! OBD-II Protocol Implementation
//!
//! This crate provides the ELM327 adapter session used by the DPF monitor:
//! the command channel abstraction (serial and scripted), AT initialization,
//! response cleaning and generic Mode 01 PID decoding.

mod adapter;
mod channel;
mod error;
mod mock;
mod pid;
mod protocol;
pub mod response;
mod serial;

pub use adapter::{
    at, parse_protocol, parse_version, parse_voltage, AdapterConfig, AdapterIdentity,
    AdapterSession, UNKNOWN,
};
pub use channel::{CommandChannel, DEFAULT_COMMAND_TIMEOUT, RESPONSE_SENTINEL};
pub use error::ObdError;
pub use mock::ScriptedChannel;
pub use pid::{decode_temperature_word, Pid, PidResponse};
pub use protocol::ObdProtocol;
pub use serial::{SerialChannel, DEFAULT_BAUD_RATE};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// On-board monitoring test results
    pub const ON_BOARD_MONITORING: u8 = 0x06;
    /// Offset added to the request mode in a positive response
    pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;
}
