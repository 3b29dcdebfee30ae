//! Daemon configuration
//!
//! Defaults, overlaid by an optional TOML file, overlaid by `DPFD__*`
//! environment variables (`DPFD__SERIAL__PORT=/dev/rfcomm0`).

use config::{Config, ConfigError, Environment, File};
use dpf_monitor::MonitorConfig;
use obd_protocol::DEFAULT_BAUD_RATE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when none is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "dpfd.toml";

const ENV_PREFIX: &str = "DPFD";

/// Serial link to the adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path; scanned for when unset and no adapter is remembered
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Wait for the `>` prompt per command (ms)
    pub command_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            command_timeout_ms: 5000,
        }
    }
}

impl SerialConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub serial: SerialConfig,
    /// Where the last connected adapter is remembered
    pub state_file: PathBuf,
    pub monitor: MonitorConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            state_file: PathBuf::from("dpfd-state.json"),
            monitor: MonitorConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from `path` (may be missing) and the environment
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
