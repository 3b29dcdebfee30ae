//! Engine ECU CAN Addressing

use serde::{Deserialize, Serialize};

/// CAN identifier width used to reach the engine ECU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Addressing {
    /// 11-bit identifiers (7E0 / 7E8)
    Standard11Bit,
    /// 29-bit normal fixed identifiers (18DA10F1 / 18DAF110)
    Extended29Bit,
}

impl Addressing {
    /// Tester → ECU request identifier
    pub fn request_id(&self) -> &'static str {
        match self {
            Addressing::Standard11Bit => "7E0",
            Addressing::Extended29Bit => "18DA10F1",
        }
    }

    /// ECU → tester response identifier
    pub fn response_id(&self) -> &'static str {
        match self {
            Addressing::Standard11Bit => "7E8",
            Addressing::Extended29Bit => "18DAF110",
        }
    }

    /// Identifier width in bits
    pub fn bits(&self) -> u8 {
        match self {
            Addressing::Standard11Bit => 11,
            Addressing::Extended29Bit => 29,
        }
    }
}

/// Flow-control frame data for 29-bit sessions: continue to send, no block
/// limit, no separation time
pub const FLOW_CONTROL_DATA_29BIT: &str = "300000";

/// User-defined header and data for flow-control frames
pub const FLOW_CONTROL_MODE_29BIT: u8 = 1;
