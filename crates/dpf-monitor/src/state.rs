//! Monitoring State

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a monitoring session.
///
/// `Idle → Connecting → Initializing → Monitoring`, with `Error` reachable
/// from the three active states and `Monitoring → Idle` on stop or link loss.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitoringState {
    #[default]
    Idle,
    Connecting,
    Initializing,
    Monitoring,
    Error,
}

impl MonitoringState {
    /// Check if a session is polling the ECU
    pub fn is_monitoring(&self) -> bool {
        matches!(self, MonitoringState::Monitoring)
    }

    /// Get state name
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitoringState::Idle => "idle",
            MonitoringState::Connecting => "connecting",
            MonitoringState::Initializing => "initializing",
            MonitoringState::Monitoring => "monitoring",
            MonitoringState::Error => "error",
        }
    }
}

impl fmt::Display for MonitoringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(MonitoringState::default(), MonitoringState::Idle);
        assert!(!MonitoringState::Idle.is_monitoring());
        assert!(MonitoringState::Monitoring.is_monitoring());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&MonitoringState::Monitoring).unwrap();
        assert_eq!(json, "\"monitoring\"");
        assert_eq!(MonitoringState::Error.to_string(), "error");
    }
}
