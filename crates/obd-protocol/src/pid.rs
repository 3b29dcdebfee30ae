//! OBD-II PID Definitions and Response Parsing
//!
//! Only the generic PIDs the legacy readout path needs are defined here.

use crate::mode;
use crate::response::find_payload;
use serde::{Deserialize, Serialize};

/// Mode 01 PIDs used by the legacy readout path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Supported PIDs 01-20 (0x00)
    SupportedPids = 0x00,
    /// Exhaust gas temperature bank 1 (0x78)
    ExhaustGasTemperatureBank1 = 0x78,
    /// Diesel particulate filter temperature (0x7C)
    DpfTemperature = 0x7C,
}

impl Pid {
    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Request string, e.g. `017C`
    pub fn request(&self) -> String {
        format!("{:02X}{:02X}", mode::CURRENT_DATA, self.as_hex())
    }

    /// Get the number of data bytes after the `41 xx` prefix
    pub fn response_bytes(&self) -> usize {
        match self {
            Pid::SupportedPids => 4,
            // Sensor support mask + sensor 1 word
            Pid::ExhaustGasTemperatureBank1 | Pid::DpfTemperature => 3,
        }
    }
}

/// Response from a Mode 01 PID query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidResponse {
    /// The PID that was queried
    pub pid: u8,
    /// Decoded value, `None` when the data was too short
    pub value: Option<f64>,
    /// Data bytes after the `41 xx` prefix
    pub raw_bytes: Vec<u8>,
}

impl PidResponse {
    /// Create a new PID response by decoding raw data bytes
    pub fn decode(pid: u8, raw_bytes: Vec<u8>) -> Self {
        let value = Self::decode_value(pid, &raw_bytes);
        Self {
            pid,
            value,
            raw_bytes,
        }
    }

    /// Parse a cleaned adapter response for `pid`.
    ///
    /// Returns `None` when the positive response `41 xx` is absent, which is
    /// how an ECU that does not support the PID answers.
    pub fn parse(pid: Pid, response: &str) -> Option<Self> {
        let prefix = [
            mode::CURRENT_DATA + mode::POSITIVE_RESPONSE_OFFSET,
            pid.as_hex(),
        ];
        let payload = find_payload(response, &prefix)?;
        Some(Self::decode(pid.as_hex(), payload[2..].to_vec()))
    }

    fn decode_value(pid: u8, bytes: &[u8]) -> Option<f64> {
        match pid {
            // Bitmask, no physical value
            0x00 => None,
            // Temperature sensor 1: ((B*256)+C)/10 - 40 (°C)
            0x78 | 0x7C if bytes.len() >= 3 => Some(decode_temperature_word(bytes[1], bytes[2])),
            _ => None,
        }
    }
}

/// Decode a big-endian word in 0.1 K steps offset by 40 °C
pub fn decode_temperature_word(high: u8, low: u8) -> f64 {
    f64::from(u16::from_be_bytes([high, low])) / 10.0 - 40.0
}
