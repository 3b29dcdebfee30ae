//! VAG Diagnostic Session

use crate::addressing::{Addressing, FLOW_CONTROL_DATA_29BIT, FLOW_CONTROL_MODE_29BIT};
use crate::blocks::{
    decode_distance, decode_regen_status, decode_soot_mass, decode_temperature_pair,
    MeasuringBlock,
};
use crate::data::{DpfData, ReadoutMode};
use crate::error::ReadoutError;
use crate::service;
use chrono::Utc;
use obd_protocol::response::{contains_hex, find_payload, is_negative_response};
use obd_protocol::{at, mode, AdapterSession, ObdError, ObdProtocol, Pid, PidResponse};
use regen_detector::{DetectorConfig, DetectorInput, RegenDetector};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Mode 06 test id carrying DPF monitor results
const DPF_MONITOR_TID: u8 = 0xB2;

/// Soot byte scale in the Mode 06 DPF monitor result
const MODE06_SOOT_SCALE: f64 = 2.55;

/// DPF and exhaust temperatures from one read
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TemperaturePair {
    pub dpf: Option<f64>,
    pub exhaust: Option<f64>,
}

/// Diagnostic session with the engine ECU.
///
/// Owns the adapter session, the regeneration detector and the most recent
/// reading. Every operation issues its commands strictly one after another.
pub struct VagSession {
    adapter: AdapterSession,
    detector: RegenDetector,
    addressing: Option<Addressing>,
    session_confirmed: bool,
    last_data: Option<Arc<DpfData>>,
    /// Soot mass actually measured by the previous reading
    last_soot_g: Option<f64>,
}

impl VagSession {
    /// Create a session on top of an adapter session
    pub fn new(adapter: AdapterSession, detector_config: DetectorConfig) -> Self {
        Self {
            adapter,
            detector: RegenDetector::new(detector_config),
            addressing: None,
            session_confirmed: false,
            last_data: None,
            last_soot_g: None,
        }
    }

    /// Addressing chosen by the last successful initialization
    pub fn addressing(&self) -> Option<Addressing> {
        self.addressing
    }

    /// Whether the ECU explicitly confirmed the extended session
    pub fn is_session_confirmed(&self) -> bool {
        self.session_confirmed
    }

    /// Establish addressing and open the extended diagnostic session.
    ///
    /// Tries 11-bit identifiers first and falls back to 29-bit. Returns
    /// `false` when neither works.
    pub async fn initialize(&mut self) -> bool {
        self.addressing = None;
        self.session_confirmed = false;
        self.last_soot_g = None;
        self.detector.reset();

        match self.try_standard_addressing().await {
            Ok(true) => return self.select(Addressing::Standard11Bit),
            Ok(false) => info!("11-bit session not available, trying 29-bit addressing"),
            Err(e) => warn!("11-bit setup failed ({}), trying 29-bit addressing", e),
        }

        match self.try_extended_addressing().await {
            Ok(true) => self.select(Addressing::Extended29Bit),
            Ok(false) => {
                error!("Engine ECU rejected the diagnostic session on 11-bit and 29-bit");
                false
            }
            Err(e) => {
                error!("29-bit setup failed: {}", e);
                false
            }
        }
    }

    fn select(&mut self, addressing: Addressing) -> bool {
        info!(
            "Diagnostic session open with {}-bit addressing ({} -> {})",
            addressing.bits(),
            addressing.request_id(),
            addressing.response_id()
        );
        self.addressing = Some(addressing);
        true
    }

    async fn try_standard_addressing(&mut self) -> Result<bool, ObdError> {
        let ids = Addressing::Standard11Bit;
        self.adapter
            .send_command(&ObdProtocol::Iso15765_4Can11bit500.to_elm_command())
            .await?;
        self.adapter.send_command(&at::set_header(ids.request_id())).await?;
        self.adapter.set_can_receive_address(ids.response_id()).await?;
        self.adapter.set_can_flow_control(true).await?;

        let probe = self.adapter.send_command(&Pid::SupportedPids.request()).await?;
        let expected = [
            mode::CURRENT_DATA + mode::POSITIVE_RESPONSE_OFFSET,
            Pid::SupportedPids.as_hex(),
        ];
        if find_payload(&probe, &expected).is_none() {
            debug!("No positive reply to supported-PIDs probe: {:?}", probe);
            return Ok(false);
        }

        self.start_diagnostic_session().await
    }

    async fn try_extended_addressing(&mut self) -> Result<bool, ObdError> {
        let ids = Addressing::Extended29Bit;
        self.adapter
            .send_command(&ObdProtocol::Iso15765_4Can11bit500.to_elm_command())
            .await?;
        self.adapter.send_command(at::CAN_EXTENDED_ADDRESS).await?;
        self.adapter.send_command(&at::set_header(ids.request_id())).await?;
        self.adapter.set_can_receive_address(ids.response_id()).await?;

        self.adapter
            .send_command(&at::flow_control_header(ids.request_id()))
            .await?;
        self.adapter
            .send_command(&at::flow_control_data(FLOW_CONTROL_DATA_29BIT))
            .await?;
        self.adapter
            .send_command(&at::flow_control_mode(FLOW_CONTROL_MODE_29BIT))
            .await?;

        self.start_diagnostic_session().await
    }

    /// Open the extended diagnostic session.
    ///
    /// Acceptance is permissive: an explicit `50 03` confirms, a `7F 10`
    /// negative response rejects, and any other reply is accepted
    /// tentatively because many ECUs answer inconsistently. This is a
    /// heuristic, not a protocol guarantee.
    async fn start_diagnostic_session(&mut self) -> Result<bool, ObdError> {
        let response = self
            .adapter
            .send_command(service::START_DIAGNOSTIC_SESSION)
            .await?;

        if contains_hex(&response, service::SESSION_STARTED) {
            self.session_confirmed = true;
            return Ok(true);
        }
        if is_negative_response(&response, service::DIAGNOSTIC_SESSION_CONTROL) {
            warn!("Diagnostic session negative response: {}", response);
            return Ok(false);
        }

        warn!("Unrecognized session reply {:?}, continuing tentatively", response);
        Ok(true)
    }

    async fn fetch_block(&self, block: MeasuringBlock) -> Result<Option<Vec<u8>>, ObdError> {
        let response = self.adapter.send_command(&block.request()).await?;
        let payload = block.extract(&response);
        if payload.is_none() {
            debug!("{:?} unavailable: {:?}", block, response);
        }
        Ok(payload)
    }

    async fn try_soot_mass(&self) -> Result<Option<f64>, ObdError> {
        Ok(self
            .fetch_block(MeasuringBlock::SootMass)
            .await?
            .and_then(|p| decode_soot_mass(&p)))
    }

    async fn try_regen_status(&self) -> Result<Option<u8>, ObdError> {
        Ok(self
            .fetch_block(MeasuringBlock::RegenStatus)
            .await?
            .and_then(|p| decode_regen_status(&p)))
    }

    async fn try_temperatures(&self) -> Result<Option<(f64, f64)>, ObdError> {
        Ok(self
            .fetch_block(MeasuringBlock::DpfTemperatures)
            .await?
            .and_then(|p| decode_temperature_pair(&p)))
    }

    async fn try_distance(&self) -> Result<Option<u32>, ObdError> {
        Ok(self
            .fetch_block(MeasuringBlock::DistanceSinceRegen)
            .await?
            .and_then(|p| decode_distance(&p)))
    }

    /// Soot mass in grams, `0.0` when unavailable
    pub async fn read_soot_mass(&self) -> f64 {
        absorb("soot mass", self.try_soot_mass().await).unwrap_or(0.0)
    }

    /// Regeneration status byte, `0` when unavailable
    pub async fn read_regen_status(&self) -> u8 {
        absorb("regeneration status", self.try_regen_status().await).unwrap_or(0)
    }

    /// DPF and exhaust temperatures, both `None` when unavailable
    pub async fn read_temperatures(&self) -> TemperaturePair {
        absorb("temperatures", self.try_temperatures().await)
            .map(|(dpf, exhaust)| TemperaturePair {
                dpf: Some(dpf),
                exhaust: Some(exhaust),
            })
            .unwrap_or_default()
    }

    /// Distance since the last regeneration in km
    pub async fn read_distance_since_regen(&self) -> Option<u32> {
        absorb("distance since regeneration", self.try_distance().await)
    }

    /// Read all DPF values, run detection and cache the result.
    ///
    /// Individual unsupported blocks degrade to empty fields. If the readout
    /// as a whole fails, generic OBD-II requests are tried instead.
    pub async fn read_dpf_data(&mut self) -> Option<Arc<DpfData>> {
        match self.read_extended().await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Measuring block readout failed ({}), using generic OBD fallback", e);
                self.read_fallback().await
            }
        }
    }

    async fn read_extended(&mut self) -> Result<Arc<DpfData>, ReadoutError> {
        let soot = self.try_soot_mass().await?;
        let status = self.try_regen_status().await?;
        let temperatures = self.try_temperatures().await?;
        let distance = self.try_distance().await?;

        if soot.is_none() && status.is_none() && temperatures.is_none() && distance.is_none() {
            return Err(ReadoutError::NoBlocksSupported);
        }

        let (dpf, exhaust) = match temperatures {
            Some((dpf, exhaust)) => (Some(dpf), Some(exhaust)),
            None => (None, None),
        };
        Ok(self.assemble(
            soot,
            status.unwrap_or(0),
            dpf,
            exhaust,
            distance,
            ReadoutMode::Extended,
        ))
    }

    async fn read_fallback(&mut self) -> Option<Arc<DpfData>> {
        let mut reachable = false;

        let request = format!("{:02X}{:02X}", mode::ON_BOARD_MONITORING, DPF_MONITOR_TID);
        let monitor = match self.adapter.send_command(&request).await {
            Ok(response) => {
                reachable = true;
                parse_dpf_monitor(&response)
            }
            Err(e) => {
                debug!("Mode 06 DPF monitor read failed: {}", e);
                None
            }
        };

        let dpf = self.read_pid_value(Pid::DpfTemperature, &mut reachable).await;
        let exhaust = self
            .read_pid_value(Pid::ExhaustGasTemperatureBank1, &mut reachable)
            .await;

        if !reachable {
            error!("Fallback DPF readout failed: adapter unreachable");
            return None;
        }

        let soot = monitor.map(|(soot, _)| soot);
        // The monitor only reports a flag; treat it as an active regeneration
        let regenerating = monitor.is_some_and(|(_, flag)| flag);
        let status = if regenerating { 2 } else { 0 };
        Some(self.assemble(soot, status, dpf, exhaust, None, ReadoutMode::Legacy))
    }

    async fn read_pid_value(&self, pid: Pid, reachable: &mut bool) -> Option<f64> {
        match self.adapter.send_command(&pid.request()).await {
            Ok(response) => {
                *reachable = true;
                PidResponse::parse(pid, &response).and_then(|r| r.value)
            }
            Err(e) => {
                debug!("PID {:02X} read failed: {}", pid.as_hex(), e);
                None
            }
        }
    }

    fn assemble(
        &mut self,
        soot: Option<f64>,
        status: u8,
        dpf: Option<f64>,
        exhaust: Option<f64>,
        distance: Option<u32>,
        mode: ReadoutMode,
    ) -> Arc<DpfData> {
        let now = Utc::now();
        let input = DetectorInput {
            soot_mass_g: soot,
            previous_soot_mass_g: self.last_soot_g,
            regen_status: status,
            dpf_temp_c: dpf,
            exhaust_temp_c: exhaust,
            timestamp_ms: now.timestamp_millis(),
        };
        let detection = self.detector.evaluate(&input);

        self.last_soot_g = soot;

        let soot = soot.unwrap_or(0.0);
        let data = Arc::new(DpfData {
            soot_load: soot,
            soot_load_percent: self.detector.config().soot_load_percent(soot),
            is_regenerating: detection.is_regenerating,
            regen_phase: detection.phase,
            dpf_temperature: dpf,
            exhaust_temperature: exhaust,
            distance_since_regen: distance,
            time_since_regen: None,
            last_update: now,
            mode,
        });
        self.last_data = Some(data.clone());
        data
    }

    /// Most recent reading, without touching the ECU
    pub fn last_dpf_data(&self) -> Option<Arc<DpfData>> {
        self.last_data.clone()
    }
}

fn absorb<T>(what: &str, result: Result<Option<T>, ObdError>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            debug!("Reading {} failed: {}", what, e);
            None
        }
    }
}

/// Soot mass and regeneration flag from a Mode 06 `B2` reply
fn parse_dpf_monitor(response: &str) -> Option<(f64, bool)> {
    let prefix = [
        mode::ON_BOARD_MONITORING + mode::POSITIVE_RESPONSE_OFFSET,
        DPF_MONITOR_TID,
    ];
    let bytes = find_payload(response, &prefix)?;
    if bytes.len() < 6 {
        return None;
    }
    Some((f64::from(bytes[4]) / MODE06_SOOT_SCALE, bytes[5] > 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{AdapterConfig, ScriptedChannel};
    use regen_detector::RegenPhase;

    fn session_over(channel: &Arc<ScriptedChannel>) -> VagSession {
        let adapter = AdapterSession::new(channel.clone(), AdapterConfig::default());
        VagSession::new(adapter, DetectorConfig::default())
    }

    fn healthy_ecu() -> Arc<ScriptedChannel> {
        let channel = Arc::new(ScriptedChannel::elm327());
        channel.respond("223278", "7E8 05 62 32 78 0A 28");
        channel.respond("223282", "7E8 04 62 32 82 00");
        channel.respond("223972", "7E8 07 62 39 72 0F A0 0E 10");
        channel.respond("223274", "7E8 05 62 32 74 01 2C");
        channel
    }

    #[tokio::test]
    async fn test_initialize_with_11bit() {
        let channel = healthy_ecu();
        let mut session = session_over(&channel);

        assert!(session.initialize().await);
        assert_eq!(session.addressing(), Some(Addressing::Standard11Bit));
        assert!(session.is_session_confirmed());
        assert_eq!(
            channel.sent(),
            vec!["ATSP6", "ATSH7E0", "ATCRA7E8", "ATCFC1", "0100", "1003"]
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_29bit() {
        let channel = healthy_ecu();
        channel.respond("0100", "NO DATA");
        let mut session = session_over(&channel);

        assert!(session.initialize().await);
        assert_eq!(session.addressing(), Some(Addressing::Extended29Bit));
        assert_eq!(
            channel.sent(),
            vec![
                "ATSP6", "ATSH7E0", "ATCRA7E8", "ATCFC1", "0100", "ATSP6", "ATCEA",
                "ATSH18DA10F1", "ATCRA18DAF110", "ATFCSH18DA10F1", "ATFCSD300000",
                "ATFCSM1", "1003"
            ]
        );
    }

    #[tokio::test]
    async fn test_both_addressing_modes_rejected() {
        let channel = healthy_ecu();
        channel.respond("0100", "NO DATA");
        channel.respond("1003", "7F 10 12");
        let mut session = session_over(&channel);

        assert!(!session.initialize().await);
        assert_eq!(session.addressing(), None);
        // The 29-bit sequence ran before giving up
        assert_eq!(channel.count("ATCEA"), 1);
    }

    #[tokio::test]
    async fn test_11bit_session_rejected_tries_29bit() {
        let channel = healthy_ecu();
        channel.respond_once("1003", "7F 10 22");
        let mut session = session_over(&channel);

        assert!(session.initialize().await);
        assert_eq!(session.addressing(), Some(Addressing::Extended29Bit));
    }

    #[tokio::test]
    async fn test_unrecognized_session_reply_accepted_tentatively() {
        let channel = healthy_ecu();
        channel.respond("1003", "CAN ERROR");
        let mut session = session_over(&channel);

        assert!(session.initialize().await);
        assert!(!session.is_session_confirmed());
    }

    #[tokio::test]
    async fn test_read_dpf_data_decodes_blocks() {
        let channel = healthy_ecu();
        let mut session = session_over(&channel);

        let data = session.read_dpf_data().await.unwrap();
        assert_eq!(data.soot_load, 26.0);
        assert!((data.soot_load_percent - 26.0 / 45.0 * 100.0).abs() < 1e-9);
        // 0x0FA0 = 4000 -> 360 °C, 0x0E10 = 3600 -> 320 °C
        assert_eq!(data.dpf_temperature, Some(360.0));
        assert_eq!(data.exhaust_temperature, Some(320.0));
        assert_eq!(data.distance_since_regen, Some(300));
        assert_eq!(data.time_since_regen, None);
        assert!(!data.is_regenerating);
        assert_eq!(data.regen_phase, RegenPhase::None);
        assert_eq!(data.mode, ReadoutMode::Extended);
        assert_eq!(
            channel.sent(),
            vec!["223278", "223282", "223972", "223274"]
        );
    }

    #[tokio::test]
    async fn test_status_byte_marks_regeneration() {
        let channel = healthy_ecu();
        channel.respond("223282", "62 32 82 03");
        channel.respond("223972", "NO DATA");
        let mut session = session_over(&channel);

        let data = session.read_dpf_data().await.unwrap();
        assert!(data.is_regenerating);
        assert_eq!(data.regen_phase, RegenPhase::Service);
        assert_eq!(data.dpf_temperature, None);
    }

    #[tokio::test]
    async fn test_soot_drop_between_reads() {
        let channel = healthy_ecu();
        channel.respond_once("223278", "62 32 78 0B B8"); // 30.00 g
        let mut session = session_over(&channel);

        assert!(!session.read_dpf_data().await.unwrap().is_regenerating);
        // Standing 26.00 g reply: a 4 g drop is not enough
        assert!(!session.read_dpf_data().await.unwrap().is_regenerating);
    }

    #[tokio::test]
    async fn test_soot_drop_from_low_level_ignored() {
        let channel = healthy_ecu();
        channel.respond("223278", "62 32 78 07 D0"); // 20.00 g
        let mut session = session_over(&channel);
        session.read_dpf_data().await.unwrap();

        channel.respond("223278", "62 32 78 04 B0"); // 12.00 g
        assert!(!session.read_dpf_data().await.unwrap().is_regenerating);
    }

    #[tokio::test]
    async fn test_large_soot_drop_from_high_level() {
        let channel = healthy_ecu();
        channel.respond_once("223278", "62 32 78 0C 1C"); // 31.00 g
        let mut session = session_over(&channel);

        session.read_dpf_data().await.unwrap();
        // Standing reply 26 g: drop of 5 g is not strictly greater
        assert!(!session.read_dpf_data().await.unwrap().is_regenerating);

        channel.respond_once("223278", "62 32 78 0C 1C"); // back to 31 g
        session.read_dpf_data().await.unwrap();
        channel.respond_once("223278", "62 32 78 07 D0"); // 20 g
        let data = session.read_dpf_data().await.unwrap();
        assert!(data.is_regenerating);
        assert_eq!(data.regen_phase, RegenPhase::Active);
    }

    #[tokio::test]
    async fn test_missing_soot_reading_is_not_a_drop() {
        let channel = healthy_ecu();
        channel.respond_once("223278", "62 32 78 0C 1C"); // 31.00 g
        let mut session = session_over(&channel);
        session.read_dpf_data().await.unwrap();

        channel.respond_once("223278", "NO DATA");
        let data = session.read_dpf_data().await.unwrap();
        assert_eq!(data.soot_load, 0.0);
        assert!(!data.is_regenerating);

        // No measured value to compare against after the gap
        channel.respond_once("223278", "62 32 78 07 D0"); // 20 g
        assert!(!session.read_dpf_data().await.unwrap().is_regenerating);
    }

    #[tokio::test]
    async fn test_single_block_failure_degrades_field() {
        let channel = healthy_ecu();
        channel.respond("223274", "7F 22 31");
        let mut session = session_over(&channel);

        let data = session.read_dpf_data().await.unwrap();
        assert_eq!(data.distance_since_regen, None);
        assert_eq!(data.soot_load, 26.0);
        assert_eq!(data.mode, ReadoutMode::Extended);
    }

    #[tokio::test]
    async fn test_typed_reads_return_sentinels() {
        let channel = Arc::new(ScriptedChannel::with_default_reply("NO DATA"));
        channel.fail("223282", ObdError::Timeout(5000));
        let session = session_over(&channel);

        assert_eq!(session.read_soot_mass().await, 0.0);
        assert_eq!(session.read_regen_status().await, 0);
        assert_eq!(session.read_temperatures().await, TemperaturePair::default());
        assert_eq!(session.read_distance_since_regen().await, None);
    }

    #[tokio::test]
    async fn test_fallback_when_no_block_supported() {
        let channel = Arc::new(ScriptedChannel::with_default_reply("7F 22 11"));
        channel.respond("06B2", "46 B2 00 00 33 01");
        channel.respond("017C", "41 7C 01 1B 58");
        channel.respond("0178", "NO DATA");
        let mut session = session_over(&channel);

        let data = session.read_dpf_data().await.unwrap();
        assert_eq!(data.mode, ReadoutMode::Legacy);
        assert!((data.soot_load - 0x33 as f64 / 2.55).abs() < 1e-9);
        assert_eq!(data.dpf_temperature, Some(660.0));
        assert_eq!(data.exhaust_temperature, None);
        assert!(data.is_regenerating);
        assert_eq!(data.regen_phase, RegenPhase::Active);
    }

    #[tokio::test]
    async fn test_fallback_after_transport_failure() {
        let channel = healthy_ecu();
        channel.fail_once("223282", ObdError::Timeout(5000));
        channel.respond("06B2", "NO DATA");
        channel.respond("017C", "41 7C 01 11 94");
        let mut session = session_over(&channel);

        let data = session.read_dpf_data().await.unwrap();
        assert_eq!(data.mode, ReadoutMode::Legacy);
        assert_eq!(data.soot_load, 0.0);
        assert_eq!(data.dpf_temperature, Some(410.0));
    }

    #[tokio::test]
    async fn test_unreachable_adapter_yields_none() {
        let channel = healthy_ecu();
        channel.set_open(false);
        let mut session = session_over(&channel);

        assert!(session.read_dpf_data().await.is_none());
        assert!(session.last_dpf_data().is_none());
    }

    #[tokio::test]
    async fn test_last_dpf_data_is_cached_object() {
        let channel = healthy_ecu();
        let mut session = session_over(&channel);
        let read = session.read_dpf_data().await.unwrap();

        let first = session.last_dpf_data().unwrap();
        let second = session.last_dpf_data().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &read));
    }
}
