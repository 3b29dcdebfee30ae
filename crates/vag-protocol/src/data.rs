//! DPF Readings

use chrono::{DateTime, Utc};
use regen_detector::RegenPhase;
use serde::{Deserialize, Serialize};

/// Where a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadoutMode {
    /// Manufacturer measuring blocks (ReadDataByIdentifier)
    Extended,
    /// Generic OBD-II Mode 06 / Mode 01
    Legacy,
}

/// One poll cycle of DPF state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpfData {
    /// Soot mass (g)
    pub soot_load: f64,
    /// Soot mass relative to a full filter (0-100 %)
    pub soot_load_percent: f64,
    pub is_regenerating: bool,
    pub regen_phase: RegenPhase,
    /// DPF temperature (°C)
    pub dpf_temperature: Option<f64>,
    /// Exhaust temperature (°C)
    pub exhaust_temperature: Option<f64>,
    /// Distance since the last completed regeneration (km)
    pub distance_since_regen: Option<u32>,
    /// Reserved, never populated
    pub time_since_regen: Option<u64>,
    pub last_update: DateTime<Utc>,
    pub mode: ReadoutMode,
}
