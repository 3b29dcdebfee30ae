//! Monitor configuration

use obd_protocol::AdapterConfig;
use regen_detector::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and tuning for [`crate::DpfMonitor`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between DPF reads (ms)
    pub poll_interval_ms: u64,
    /// Scan duration before giving up and returning to idle (ms)
    pub scan_timeout_ms: u64,
    /// Window for finding the last adapter after returning to the foreground (ms)
    pub reconnect_timeout_ms: u64,
    /// Events buffered per subscriber before the oldest are dropped
    pub event_buffer: usize,
    pub adapter: AdapterConfig,
    pub detector: DetectorConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            scan_timeout_ms: 12_000,
            reconnect_timeout_ms: 15_000,
            event_buffer: 64,
            adapter: AdapterConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Time between ECU reads
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// How long a scan runs before it is stopped
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    /// How long a foreground reconnect looks for the last adapter
    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }
}
