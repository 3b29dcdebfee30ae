//! Regeneration Detection Rules

use crate::config::DetectorConfig;
use ring_buffer::TemperatureHistory;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Regeneration phase as reported by the engine ECU
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegenPhase {
    /// Not regenerating
    #[default]
    None,
    /// Passive (continuous) regeneration at high exhaust temperature
    Passive,
    /// Active regeneration with post-injection
    Active,
    /// Service (forced) regeneration
    Service,
}

/// Which rule produced the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    /// ECU status byte was nonzero
    StatusByte,
    /// Soot mass dropped from a high level
    SootDrop,
    /// Temperature threshold or rise rate fired this cycle
    Temperature,
    /// Held by an earlier temperature detection
    Sustained,
    /// No rule fired
    None,
}

/// One poll cycle worth of signals
#[derive(Debug, Clone, Default)]
pub struct DetectorInput {
    /// Current soot mass (g), `None` when it could not be read
    pub soot_mass_g: Option<f64>,
    /// Soot mass of the previous reading, if any
    pub previous_soot_mass_g: Option<f64>,
    /// Raw regeneration status byte (0 = idle)
    pub regen_status: u8,
    /// DPF temperature (°C)
    pub dpf_temp_c: Option<f64>,
    /// Exhaust temperature upstream of the DPF (°C)
    pub exhaust_temp_c: Option<f64>,
    /// Sample time (Unix ms)
    pub timestamp_ms: i64,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub is_regenerating: bool,
    pub phase: RegenPhase,
    pub source: DetectionSource,
}

/// Stateful regeneration detector.
///
/// Rules are checked in order and the first that fires wins:
///
/// 1. status byte > 0
/// 2. soot mass dropped by more than the drop threshold from above the high-soot mark
/// 3. DPF or exhaust temperature above its high threshold, or a fast DPF
///    temperature rise above normal operating temperature
/// 4. an earlier temperature detection that has not yet seen enough
///    consecutive samples below normal operating temperature
pub struct RegenDetector {
    config: DetectorConfig,
    history: TemperatureHistory,
    /// Set when rule 3 fires; cleared by rule 1 or the cool-down condition
    temperature_detected: bool,
}

impl RegenDetector {
    /// Create a new detector
    pub fn new(config: DetectorConfig) -> Self {
        let history = TemperatureHistory::new(config.history_capacity);
        Self {
            config,
            history,
            temperature_detected: false,
        }
    }

    /// Evaluate one cycle of signals. Never fails; missing temperatures are
    /// treated as absence of evidence.
    pub fn evaluate(&mut self, input: &DetectorInput) -> Detection {
        let (is_regenerating, source) = self.decide(input);
        let phase = self.classify(is_regenerating, input.regen_status);

        debug!(
            "Regeneration {} via {:?} (status {}, soot {:?} g, dpf {:?}, exhaust {:?})",
            is_regenerating,
            source,
            input.regen_status,
            input.soot_mass_g,
            input.dpf_temp_c,
            input.exhaust_temp_c
        );

        Detection {
            is_regenerating,
            phase,
            source,
        }
    }

    fn decide(&mut self, input: &DetectorInput) -> (bool, DetectionSource) {
        if input.regen_status > 0 {
            self.temperature_detected = false;
            return (true, DetectionSource::StatusByte);
        }

        if let (Some(previous), Some(current)) = (input.previous_soot_mass_g, input.soot_mass_g) {
            let dropped = previous - current > self.config.soot_drop_threshold_g;
            let was_high = previous > self.config.high_soot_threshold_g;
            if dropped && was_high {
                return (true, DetectionSource::SootDrop);
            }
        }

        if let Some(dpf) = input.dpf_temp_c {
            self.history.push(input.timestamp_ms, dpf, input.exhaust_temp_c);
        }

        if self.temperature_fires(input) {
            if !self.temperature_detected {
                info!(
                    "Regeneration detected from temperature (exhaust peak {:?})",
                    self.history.peak_exhaust()
                );
            }
            self.temperature_detected = true;
            return (true, DetectionSource::Temperature);
        }

        if self.temperature_detected {
            let cooled = self.history.trailing_dpf_below(
                self.config.end_confirm_samples,
                self.config.dpf_temp_normal_max_c,
            );
            if cooled {
                info!("DPF cooled below normal maximum, temperature detection cleared");
                self.temperature_detected = false;
                return (false, DetectionSource::None);
            }
            return (true, DetectionSource::Sustained);
        }

        (false, DetectionSource::None)
    }

    fn temperature_fires(&self, input: &DetectorInput) -> bool {
        let config = &self.config;

        if input.dpf_temp_c.is_some_and(|t| t >= config.dpf_temp_high_c) {
            return true;
        }
        if input.exhaust_temp_c.is_some_and(|t| t >= config.exhaust_temp_high_c) {
            return true;
        }

        let Some(dpf) = input.dpf_temp_c else {
            return false;
        };
        if self.history.len() < config.min_rise_samples || dpf <= config.dpf_temp_normal_max_c {
            return false;
        }
        self.history
            .dpf_rise_rate_per_minute()
            .is_some_and(|rate| rate > config.rise_rate_threshold_c_per_min)
    }

    fn classify(&self, is_regenerating: bool, status: u8) -> RegenPhase {
        if !is_regenerating {
            return RegenPhase::None;
        }
        if self.temperature_detected && status == 0 {
            return RegenPhase::Active;
        }
        match status {
            1 => RegenPhase::Passive,
            2 => RegenPhase::Active,
            3 => RegenPhase::Service,
            _ => RegenPhase::Active,
        }
    }

    /// Whether a temperature-based detection is being held
    pub fn is_temperature_detected(&self) -> bool {
        self.temperature_detected
    }

    /// Temperature samples seen so far
    pub fn history(&self) -> &TemperatureHistory {
        &self.history
    }

    /// Active configuration
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Forget history and sticky state
    pub fn reset(&mut self) {
        self.history.clear();
        self.temperature_detected = false;
    }
}

impl Default for RegenDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
