//! Detector configuration

use serde::{Deserialize, Serialize};

/// Thresholds for regeneration detection.
///
/// Defaults are empirical values for VAG 2.0 TDI engines; they are not
/// derived from any calibration procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Soot drop between polls that counts as burn-off (g)
    pub soot_drop_threshold_g: f64,

    /// Previous soot mass must exceed this for a drop to count (g)
    pub high_soot_threshold_g: f64,

    /// Soot mass treated as a full filter, for the load percentage (g)
    pub max_soot_load_g: f64,

    /// DPF temperature that alone indicates regeneration (°C)
    pub dpf_temp_high_c: f64,

    /// Exhaust temperature that alone indicates regeneration (°C)
    pub exhaust_temp_high_c: f64,

    /// Upper bound of normal DPF operating temperature (°C)
    pub dpf_temp_normal_max_c: f64,

    /// DPF temperature rise that indicates regeneration (°C/min)
    pub rise_rate_threshold_c_per_min: f64,

    /// Samples needed before the rise rate is trusted
    pub min_rise_samples: usize,

    /// Consecutive samples below normal max that end a temperature-detected regeneration
    pub end_confirm_samples: usize,

    /// Temperature history length
    pub history_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            soot_drop_threshold_g: 5.0,
            high_soot_threshold_g: 25.0,
            max_soot_load_g: 45.0,
            dpf_temp_high_c: 550.0,
            exhaust_temp_high_c: 450.0,
            dpf_temp_normal_max_c: 400.0,
            rise_rate_threshold_c_per_min: 50.0,
            min_rise_samples: 3,
            end_confirm_samples: 3,
            history_capacity: 10,
        }
    }
}

impl DetectorConfig {
    /// Soot mass as a share of a full filter, clamped to 0-100 %
    pub fn soot_load_percent(&self, soot_g: f64) -> f64 {
        if self.max_soot_load_g <= 0.0 {
            return 0.0;
        }
        (soot_g / self.max_soot_load_g * 100.0).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soot_load_percent() {
        let config = DetectorConfig::default();
        assert!((config.soot_load_percent(22.5) - 50.0).abs() < 1e-9);
        assert_eq!(config.soot_load_percent(90.0), 100.0);
        assert_eq!(config.soot_load_percent(-1.0), 0.0);
    }
}
