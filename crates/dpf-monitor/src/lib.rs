//! DPF Regeneration Monitor
//!
//! Connection lifecycle, periodic polling of the engine ECU and
//! edge-triggered regeneration events. Platform concerns (adapter transport,
//! persistence, notifications) are injected through traits.

mod config;
mod edge;
mod events;
mod monitor;
mod notify;
mod state;
mod store;
mod transport;

pub use config::MonitorConfig;
pub use edge::{RegenEdge, RegenEdgeTracker};
pub use events::MonitorEvent;
pub use monitor::DpfMonitor;
pub use notify::{Notification, Notifier, NotifierCapability, RecordingNotifier};
pub use state::MonitoringState;
pub use store::{DeviceStore, JsonFileDeviceStore, MemoryDeviceStore, StoreError};
pub use transport::{DeviceHandle, MockTransport, Transport, TransportError, TransportEvent};

pub use obd_protocol::AdapterIdentity;
pub use vag_protocol::{DpfData, ReadoutMode, RegenPhase};
