//! Monitor Events
//!
//! Everything the monitor reports to the outside world goes through one
//! broadcast channel. Subscribers that fall behind lose the oldest events.

use crate::state::MonitoringState;
use crate::transport::DeviceHandle;
use std::sync::Arc;
use vag_protocol::DpfData;

/// Event published by [`crate::DpfMonitor`]
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Lifecycle state was set
    StateChanged(MonitoringState),
    /// Transport link went up or down
    ConnectionChanged(bool),
    /// Fresh reading from a poll cycle
    DpfDataUpdated(Arc<DpfData>),
    /// Regeneration flag went from false to true
    RegenerationStarted,
    /// Regeneration flag went from true to false
    RegenerationEnded,
    /// One-line, user-facing failure description
    Error(String),
    /// Adapter discovered during a scan
    DeviceFound(DeviceHandle),
}

impl MonitorEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::StateChanged(_) => "state_changed",
            MonitorEvent::ConnectionChanged(_) => "connection_changed",
            MonitorEvent::DpfDataUpdated(_) => "dpf_data_updated",
            MonitorEvent::RegenerationStarted => "regeneration_started",
            MonitorEvent::RegenerationEnded => "regeneration_ended",
            MonitorEvent::Error(_) => "error",
            MonitorEvent::DeviceFound(_) => "device_found",
        }
    }
}
