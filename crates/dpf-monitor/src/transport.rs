//! Adapter Transport
//!
//! Discovery and link management for the OBD adapter. Implementations own the
//! physical link (Bluetooth, serial port) and hand out the command channel the
//! adapter session talks over.

use async_trait::async_trait;
use obd_protocol::{CommandChannel, ScriptedChannel};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("scan failed: {0}")]
    ScanFailed(String),

    #[error("connection to {device} failed: {reason}")]
    ConnectFailed { device: String, reason: String },
}

/// A discovered adapter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Stable identifier (MAC address, device path)
    pub id: String,
    /// Advertised or descriptive name
    pub name: Option<String>,
}

impl DeviceHandle {
    /// Handle for the adapter at `id`
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }
}

/// Unsolicited transport notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An adapter was discovered by a running scan
    DeviceFound(DeviceHandle),
    /// The link dropped without `disconnect` being called
    LinkLost,
    /// Non-fatal transport problem worth surfacing
    Error(String),
}

/// Link to the OBD adapter.
///
/// Explicit `connect`/`disconnect` calls are reported through their return
/// values only; the event stream carries what the caller did not ask for.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin discovery; results arrive as [`TransportEvent::DeviceFound`]
    async fn start_scan(&self) -> Result<(), TransportError>;

    /// End discovery
    async fn stop_scan(&self);

    /// Open the link to `device`
    async fn connect(&self, device: &DeviceHandle) -> Result<(), TransportError>;

    /// Close the link
    async fn disconnect(&self);

    /// Check if the link is open
    fn is_connected(&self) -> bool;

    /// Subscribe to transport events
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Command channel carried by the link
    fn channel(&self) -> Arc<dyn CommandChannel>;
}

/// In-memory transport over a [`ScriptedChannel`]
pub struct MockTransport {
    channel: Arc<ScriptedChannel>,
    devices: Mutex<Vec<DeviceHandle>>,
    connected: AtomicBool,
    refuse_connect: AtomicBool,
    scans: AtomicUsize,
    events: broadcast::Sender<TransportEvent>,
}

impl MockTransport {
    /// Disconnected transport whose link answers from `channel`
    pub fn new(channel: Arc<ScriptedChannel>) -> Self {
        let (events, _) = broadcast::channel(64);
        channel.set_open(false);
        Self {
            channel,
            devices: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            refuse_connect: AtomicBool::new(false),
            scans: AtomicUsize::new(0),
            events,
        }
    }

    /// Announce `device` on every scan
    pub fn add_device(&self, device: DeviceHandle) {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device);
    }

    /// Make subsequent connects fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Simulate the adapter going out of range
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.channel.set_open(false);
        let _ = self.events.send(TransportEvent::LinkLost);
    }

    /// Push an arbitrary event
    pub fn inject(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Number of scans started so far
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// The scripted channel behind the link
    pub fn scripted(&self) -> &Arc<ScriptedChannel> {
        &self.channel
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start_scan(&self) -> Result<(), TransportError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let devices = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for device in devices {
            debug!("mock scan found {}", device.id);
            let _ = self.events.send(TransportEvent::DeviceFound(device));
        }
        Ok(())
    }

    async fn stop_scan(&self) {}

    async fn connect(&self, device: &DeviceHandle) -> Result<(), TransportError> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed {
                device: device.id.clone(),
                reason: "refused".to_string(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        self.channel.set_open(true);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.channel.set_open(false);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    fn channel(&self) -> Arc<dyn CommandChannel> {
        self.channel.clone()
    }
}
