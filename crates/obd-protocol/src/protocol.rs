//! OBD-II Protocol Definitions

use serde::{Deserialize, Serialize};

/// Protocols an ELM327 adapter can be told to use (`ATSPn`) or report (`ATDPN`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObdProtocol {
    /// Automatic protocol detection
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (slow init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
    /// SAE J1939 CAN (29 bit ID, 250 kbaud)
    SaeJ1939Can,
    /// User-defined CAN 1
    User1Can,
    /// User-defined CAN 2
    User2Can,
}

impl ObdProtocol {
    /// Map an ELM327 protocol number (`0`-`C`) to a protocol
    pub fn from_code(code: char) -> Option<Self> {
        let protocol = match code.to_ascii_uppercase() {
            '0' => ObdProtocol::Auto,
            '1' => ObdProtocol::J1850Pwm,
            '2' => ObdProtocol::J1850Vpw,
            '3' => ObdProtocol::Iso9141_2,
            '4' => ObdProtocol::Iso14230_4Kwp,
            '5' => ObdProtocol::Iso14230_4KwpFast,
            '6' => ObdProtocol::Iso15765_4Can11bit500,
            '7' => ObdProtocol::Iso15765_4Can29bit500,
            '8' => ObdProtocol::Iso15765_4Can11bit250,
            '9' => ObdProtocol::Iso15765_4Can29bit250,
            'A' => ObdProtocol::SaeJ1939Can,
            'B' => ObdProtocol::User1Can,
            'C' => ObdProtocol::User2Can,
            _ => return None,
        };
        Some(protocol)
    }

    /// ELM327 protocol number
    pub fn code(&self) -> char {
        match self {
            ObdProtocol::Auto => '0',
            ObdProtocol::J1850Pwm => '1',
            ObdProtocol::J1850Vpw => '2',
            ObdProtocol::Iso9141_2 => '3',
            ObdProtocol::Iso14230_4Kwp => '4',
            ObdProtocol::Iso14230_4KwpFast => '5',
            ObdProtocol::Iso15765_4Can11bit500 => '6',
            ObdProtocol::Iso15765_4Can29bit500 => '7',
            ObdProtocol::Iso15765_4Can11bit250 => '8',
            ObdProtocol::Iso15765_4Can29bit250 => '9',
            ObdProtocol::SaeJ1939Can => 'A',
            ObdProtocol::User1Can => 'B',
            ObdProtocol::User2Can => 'C',
        }
    }

    /// Get the ELM327 AT command selecting this protocol
    pub fn to_elm_command(&self) -> String {
        format!("ATSP{}", self.code())
    }

    /// Human readable protocol name as shown to the user
    pub fn description(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "Auto",
            ObdProtocol::J1850Pwm => "SAE J1850 PWM",
            ObdProtocol::J1850Vpw => "SAE J1850 VPW",
            ObdProtocol::Iso9141_2 => "ISO 9141-2",
            ObdProtocol::Iso14230_4Kwp => "ISO 14230-4 KWP",
            ObdProtocol::Iso14230_4KwpFast => "ISO 14230-4 KWP (fast)",
            ObdProtocol::Iso15765_4Can11bit500 => "ISO 15765-4 CAN (11bit, 500kbps)",
            ObdProtocol::Iso15765_4Can29bit500 => "ISO 15765-4 CAN (29bit, 500kbps)",
            ObdProtocol::Iso15765_4Can11bit250 => "ISO 15765-4 CAN (11bit, 250kbps)",
            ObdProtocol::Iso15765_4Can29bit250 => "ISO 15765-4 CAN (29bit, 250kbps)",
            ObdProtocol::SaeJ1939Can => "SAE J1939 CAN",
            ObdProtocol::User1Can => "User1 CAN",
            ObdProtocol::User2Can => "User2 CAN",
        }
    }

    /// Check if this is a CAN protocol
    pub fn is_can(&self) -> bool {
        matches!(
            self,
            ObdProtocol::Iso15765_4Can11bit500
                | ObdProtocol::Iso15765_4Can29bit500
                | ObdProtocol::Iso15765_4Can11bit250
                | ObdProtocol::Iso15765_4Can29bit250
                | ObdProtocol::SaeJ1939Can
                | ObdProtocol::User1Can
                | ObdProtocol::User2Can
        )
    }
}

impl Default for ObdProtocol {
    fn default() -> Self {
        ObdProtocol::Iso15765_4Can11bit500
    }
}
