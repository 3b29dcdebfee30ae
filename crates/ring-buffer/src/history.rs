//! Temperature History
//!
//! Three ring buffers (DPF temperature, exhaust temperature, sample time)
//! that always advance together, so index `i` in each refers to the same
//! sample.

use crate::buffer::RingBuffer;

const MS_PER_MINUTE: f64 = 60_000.0;

/// Bounded history of temperature samples
#[derive(Debug, Clone)]
pub struct TemperatureHistory {
    dpf_temps: RingBuffer<f64>,
    exhaust_temps: RingBuffer<Option<f64>>,
    timestamps_ms: RingBuffer<i64>,
}

impl TemperatureHistory {
    /// Create a history holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            dpf_temps: RingBuffer::new(capacity),
            exhaust_temps: RingBuffer::new(capacity),
            timestamps_ms: RingBuffer::new(capacity),
        }
    }

    /// Record one sample, evicting the oldest when full
    pub fn push(&mut self, timestamp_ms: i64, dpf_temp_c: f64, exhaust_temp_c: Option<f64>) {
        self.dpf_temps.push(dpf_temp_c);
        self.exhaust_temps.push(exhaust_temp_c);
        self.timestamps_ms.push(timestamp_ms);
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.dpf_temps.len()
    }

    /// Check if no samples are held
    pub fn is_empty(&self) -> bool {
        self.dpf_temps.is_empty()
    }

    /// DPF temperature rise over the window in °C per minute.
    ///
    /// `(last - first) / elapsed minutes`; `None` with fewer than two samples
    /// or when no time has elapsed.
    pub fn dpf_rise_rate_per_minute(&self) -> Option<f64> {
        if self.len() < 2 {
            return None;
        }
        let first = *self.dpf_temps.first()?;
        let last = *self.dpf_temps.last()?;
        let elapsed_ms = self.timestamps_ms.last()? - self.timestamps_ms.first()?;
        if elapsed_ms <= 0 {
            return None;
        }
        Some((last - first) / (elapsed_ms as f64 / MS_PER_MINUTE))
    }

    /// Hottest exhaust temperature in the window
    pub fn peak_exhaust(&self) -> Option<f64> {
        self.exhaust_temps.iter().flatten().copied().reduce(f64::max)
    }

    /// Whether the last `count` DPF samples are all strictly below `threshold_c`.
    ///
    /// `false` while fewer than `count` samples exist.
    pub fn trailing_dpf_below(&self, count: usize, threshold_c: f64) -> bool {
        self.len() >= count && self.dpf_temps.iter().rev().take(count).all(|t| *t < threshold_c)
    }

    /// Drop all samples
    pub fn clear(&mut self) {
        self.dpf_temps.clear();
        self.exhaust_temps.clear();
        self.timestamps_ms.clear();
    }
}

impl Default for TemperatureHistory {
    fn default() -> Self {
        Self::new(crate::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rise_rate_over_one_minute() {
        let mut history = TemperatureHistory::new(10);
        history.push(0, 350.0, None);
        history.push(30_000, 380.0, None);
        history.push(60_000, 420.0, None);

        let rate = history.dpf_rise_rate_per_minute().unwrap();
        assert!((rate - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_rise_rate_needs_elapsed_time() {
        let mut history = TemperatureHistory::new(10);
        assert!(history.dpf_rise_rate_per_minute().is_none());
        history.push(1_000, 350.0, None);
        history.push(1_000, 400.0, None);
        assert!(history.dpf_rise_rate_per_minute().is_none());
    }

    #[test]
    fn test_buffers_advance_in_lockstep() {
        let mut history = TemperatureHistory::new(3);
        for i in 0..5 {
            history.push(i * 1000, 100.0 + i as f64, Some(200.0 + i as f64));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.dpf_temps.last(), Some(&104.0));
        assert_eq!(history.exhaust_temps.last(), Some(&Some(204.0)));
        assert_eq!(history.timestamps_ms.first(), Some(&2_000));
        assert_eq!(history.peak_exhaust(), Some(204.0));
        // Window now spans samples 2..=4
        let rate = history.dpf_rise_rate_per_minute().unwrap();
        assert!((rate - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_peak_exhaust_skips_missing() {
        let mut history = TemperatureHistory::new(10);
        history.push(0, 350.0, None);
        assert_eq!(history.peak_exhaust(), None);
        history.push(2_000, 360.0, Some(310.0));
        history.push(4_000, 370.0, None);
        history.push(6_000, 380.0, Some(290.0));
        assert_eq!(history.peak_exhaust(), Some(310.0));
    }

    #[test]
    fn test_trailing_below() {
        let mut history = TemperatureHistory::new(10);
        history.push(0, 560.0, None);
        history.push(2_000, 399.0, None);
        assert!(!history.trailing_dpf_below(3, 400.0));
        history.push(4_000, 398.0, None);
        assert!(!history.trailing_dpf_below(3, 400.0));
        history.push(6_000, 390.0, None);
        assert!(history.trailing_dpf_below(3, 400.0));
    }
}
