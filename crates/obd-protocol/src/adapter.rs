//! ELM327 Adapter Session
//!
//! Brings an ELM327-compatible adapter into a known state (echo, linefeeds
//! and spaces off, headers on, CAN 11-bit/500k selected) and cleans every
//! response before handing it upward.

use crate::channel::CommandChannel;
use crate::error::ObdError;
use crate::protocol::ObdProtocol;
use crate::response::clean_response;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, error, info};

/// Fallback text for identity fields the adapter did not report
pub const UNKNOWN: &str = "Unknown";

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ELM\d+\s*v?\d+\.\d+").unwrap());

static VOLTAGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+\.?\d*)\s*V").unwrap());

static PROTOCOL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[0-9A-C]").unwrap());

/// ELM327 AT command vocabulary
pub mod at {
    /// Soft reset
    pub const RESET: &str = "ATZ";
    /// Command echo off
    pub const ECHO_OFF: &str = "ATE0";
    /// Linefeeds off
    pub const LINEFEEDS_OFF: &str = "ATL0";
    /// Spaces between response bytes off
    pub const SPACES_OFF: &str = "ATS0";
    /// CAN headers shown in responses
    pub const HEADERS_ON: &str = "ATH1";
    /// Firmware identification
    pub const IDENTIFY: &str = "ATI";
    /// Supply voltage at the OBD socket
    pub const READ_VOLTAGE: &str = "ATRV";
    /// Describe current protocol by number
    pub const DESCRIBE_PROTOCOL_NUMBER: &str = "ATDPN";
    /// Automatic CAN flow control on
    pub const FLOW_CONTROL_ON: &str = "ATCFC1";
    /// Automatic CAN flow control off
    pub const FLOW_CONTROL_OFF: &str = "ATCFC0";
    /// CAN extended addressing
    pub const CAN_EXTENDED_ADDRESS: &str = "ATCEA";

    /// Set the transmit header
    pub fn set_header(id: &str) -> String {
        format!("ATSH{id}")
    }

    /// Filter received frames to `id`
    pub fn set_receive_address(id: &str) -> String {
        format!("ATCRA{id}")
    }

    /// Header used for outgoing flow-control frames
    pub fn flow_control_header(id: &str) -> String {
        format!("ATFCSH{id}")
    }

    /// Data bytes of outgoing flow-control frames
    pub fn flow_control_data(data: &str) -> String {
        format!("ATFCSD{data}")
    }

    /// Flow-control mode (0 auto, 1 user header and data, 2 user data)
    pub fn flow_control_mode(mode: u8) -> String {
        format!("ATFCSM{mode}")
    }
}

/// Adapter session tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Quiet period after `ATZ` before the adapter accepts commands (ms)
    pub reset_settle_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            reset_settle_ms: 1000,
        }
    }
}

/// Adapter identity reported during initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterIdentity {
    /// Firmware version, e.g. `ELM327 v1.5`
    pub version: String,
    /// Active protocol name
    pub protocol: String,
    /// Supply voltage, e.g. `12.6V`
    pub voltage: String,
}

/// Session with an ELM327-compatible adapter
pub struct AdapterSession {
    channel: Arc<dyn CommandChannel>,
    config: AdapterConfig,
    identity: Option<AdapterIdentity>,
    initialized: bool,
}

impl AdapterSession {
    /// Create a session over `channel`
    pub fn new(channel: Arc<dyn CommandChannel>, config: AdapterConfig) -> Self {
        Self {
            channel,
            config,
            identity: None,
            initialized: false,
        }
    }

    /// Run the AT initialization sequence.
    ///
    /// Returns `false` on any transport failure; the identity then stays unset.
    pub async fn initialize(&mut self) -> bool {
        self.initialized = false;
        self.identity = None;

        match self.run_init_sequence().await {
            Ok(identity) => {
                info!(
                    "Adapter ready: {} ({}), supply {}",
                    identity.version, identity.protocol, identity.voltage
                );
                self.identity = Some(identity);
                self.initialized = true;
                true
            }
            Err(e) => {
                error!("ELM327 initialization failed: {}", e);
                false
            }
        }
    }

    async fn run_init_sequence(&self) -> Result<AdapterIdentity, ObdError> {
        self.reset().await?;

        self.send_command(at::ECHO_OFF).await?;
        self.send_command(at::LINEFEEDS_OFF).await?;
        self.send_command(at::SPACES_OFF).await?;
        self.send_command(at::HEADERS_ON).await?;

        let version = parse_version(&self.send_command(at::IDENTIFY).await?);
        let voltage = parse_voltage(&self.send_command(at::READ_VOLTAGE).await?);

        self.send_command(&ObdProtocol::Iso15765_4Can11bit500.to_elm_command())
            .await?;
        let protocol =
            parse_protocol(&self.send_command(at::DESCRIBE_PROTOCOL_NUMBER).await?);

        Ok(AdapterIdentity {
            version,
            protocol,
            voltage,
        })
    }

    /// Soft reset followed by the settle delay
    pub async fn reset(&self) -> Result<(), ObdError> {
        self.send_command(at::RESET).await?;
        tokio::time::sleep(Duration::from_millis(self.config.reset_settle_ms)).await;
        Ok(())
    }

    /// Send a command and return the cleaned response
    pub async fn send_command(&self, command: &str) -> Result<String, ObdError> {
        let raw = self.channel.send_command(command).await?;
        let cleaned = clean_response(&raw);
        debug!("{} => {:?}", command, cleaned);
        Ok(cleaned)
    }

    /// Set the transmit header to `can_id`, then send `data`
    pub async fn send_raw_can(&self, can_id: &str, data: &str) -> Result<String, ObdError> {
        self.send_command(&at::set_header(can_id)).await?;
        self.send_command(data).await
    }

    /// Accept only frames from `address`
    pub async fn set_can_receive_address(&self, address: &str) -> Result<(), ObdError> {
        self.send_command(&at::set_receive_address(address)).await?;
        Ok(())
    }

    /// Toggle automatic CAN flow control
    pub async fn set_can_flow_control(&self, enabled: bool) -> Result<(), ObdError> {
        let command = if enabled {
            at::FLOW_CONTROL_ON
        } else {
            at::FLOW_CONTROL_OFF
        };
        self.send_command(command).await?;
        Ok(())
    }

    /// Identity captured by the last successful initialization
    pub fn identity(&self) -> Option<&AdapterIdentity> {
        self.identity.as_ref()
    }

    /// Whether initialization has completed
    pub fn is_ready(&self) -> bool {
        self.initialized
    }
}

/// Extract `ELM327 v1.5`-style firmware versions
pub fn parse_version(response: &str) -> String {
    VERSION_PATTERN
        .find(response)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Extract a supply voltage such as `12.6V`
pub fn parse_voltage(response: &str) -> String {
    VOLTAGE_PATTERN
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| format!("{}V", m.as_str()))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Translate an `ATDPN` reply into a protocol name.
///
/// A leading `A` followed by another digit marks an automatically selected
/// protocol (`A6`), in which case the second digit is the protocol.
pub fn parse_protocol(response: &str) -> String {
    let trimmed = response.trim();
    let candidate = match trimmed.as_bytes() {
        [b'A' | b'a', second, ..] if second.is_ascii_alphanumeric() => &trimmed[1..],
        _ => trimmed,
    };

    PROTOCOL_PATTERN
        .find(candidate)
        .and_then(|m| m.as_str().chars().next())
        .map(|code| match ObdProtocol::from_code(code) {
            Some(protocol) => protocol.description().to_string(),
            None => format!("Protocol {}", code.to_ascii_uppercase()),
        })
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedChannel;

    fn session(channel: &Arc<ScriptedChannel>) -> AdapterSession {
        AdapterSession::new(channel.clone(), AdapterConfig::default())
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("ELM327 v1.5"), "ELM327 v1.5");
        assert_eq!(parse_version("elm327 V2.1 extra"), "elm327 V2.1");
        assert_eq!(parse_version("OK"), UNKNOWN);
    }

    #[test]
    fn test_parse_voltage() {
        assert_eq!(parse_voltage("12.6V"), "12.6V");
        assert_eq!(parse_voltage("14 V"), "14V");
        assert_eq!(parse_voltage("garbage"), UNKNOWN);
    }

    #[test]
    fn test_parse_protocol() {
        assert_eq!(parse_protocol("6"), "ISO 15765-4 CAN (11bit, 500kbps)");
        assert_eq!(parse_protocol("A7"), "ISO 15765-4 CAN (29bit, 500kbps)");
        assert_eq!(parse_protocol("A"), "SAE J1939 CAN");
        assert_eq!(parse_protocol("?"), UNKNOWN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_sequence_and_identity() {
        let channel = Arc::new(ScriptedChannel::elm327());
        let mut adapter = session(&channel);

        assert!(adapter.identity().is_none());
        assert!(adapter.initialize().await);
        assert!(adapter.is_ready());

        assert_eq!(
            channel.sent(),
            vec!["ATZ", "ATE0", "ATL0", "ATS0", "ATH1", "ATI", "ATRV", "ATSP6", "ATDPN"]
        );
        let identity = adapter.identity().unwrap();
        assert_eq!(identity.version, "ELM327 v1.5");
        assert_eq!(identity.voltage, "12.6V");
        assert_eq!(identity.protocol, "ISO 15765-4 CAN (11bit, 500kbps)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_voltage_is_unknown() {
        let channel = Arc::new(ScriptedChannel::elm327());
        channel.respond("ATRV", "garbage");
        let mut adapter = session(&channel);

        assert!(adapter.initialize().await);
        assert_eq!(adapter.identity().unwrap().voltage, UNKNOWN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_aborts_initialization() {
        let channel = Arc::new(ScriptedChannel::elm327());
        channel.fail("ATH1", ObdError::Timeout(5000));
        let mut adapter = session(&channel);

        assert!(!adapter.initialize().await);
        assert!(adapter.identity().is_none());
        assert!(!adapter.is_ready());
        // Nothing after the failing step is sent
        assert_eq!(channel.sent().last().map(String::as_str), Some("ATH1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_waits_for_settle_delay() {
        let channel = Arc::new(ScriptedChannel::elm327());
        let adapter = session(&channel);

        let started = tokio::time::Instant::now();
        adapter.reset().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_send_raw_can_sets_header_first() {
        let channel = Arc::new(ScriptedChannel::new());
        channel.respond("22F190", "62 F1 90 57 56 57");
        let adapter = session(&channel);

        let response = adapter.send_raw_can("7E0", "22F190").await.unwrap();
        assert_eq!(response, "62 F1 90 57 56 57");
        assert_eq!(channel.sent(), vec!["ATSH7E0", "22F190"]);
    }
}
