//! Serial Port Transport
//!
//! Adapters appear as serial devices (USB, or Bluetooth RFCOMM bound to
//! `/dev/rfcomm*`). A scan lists the ports the OS knows about.

use crate::settings::SerialConfig;
use async_trait::async_trait;
use dpf_monitor::{DeviceHandle, Transport, TransportError, TransportEvent};
use obd_protocol::{CommandChannel, SerialChannel};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortType;
use tracing::{debug, info, warn};

/// How often an open link is checked for having dropped
const LINK_CHECK_INTERVAL: Duration = Duration::from_secs(1);

pub struct SerialTransport {
    channel: Arc<SerialChannel>,
    baud_rate: u32,
    events: broadcast::Sender<TransportEvent>,
    /// Set while the link is open on purpose
    linked: Arc<AtomicBool>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl SerialTransport {
    pub fn new(config: &SerialConfig) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            channel: Arc::new(SerialChannel::new(config.command_timeout())),
            baud_rate: config.baud_rate,
            events,
            linked: Arc::new(AtomicBool::new(false)),
            watchdog: Mutex::new(None),
        }
    }

    fn replace_watchdog(&self, task: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(
            &mut *self.watchdog.lock().unwrap_or_else(PoisonError::into_inner),
            task,
        );
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Report `LinkLost` once the channel closes without `disconnect`
    fn spawn_watchdog(&self) -> JoinHandle<()> {
        let channel = self.channel.clone();
        let linked = self.linked.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LINK_CHECK_INTERVAL);
            loop {
                ticker.tick().await;
                if !linked.load(Ordering::SeqCst) {
                    break;
                }
                if !channel.is_open() {
                    linked.store(false, Ordering::SeqCst);
                    warn!("Serial link closed unexpectedly");
                    let _ = events.send(TransportEvent::LinkLost);
                    break;
                }
            }
        })
    }
}

fn describe(port_type: &SerialPortType) -> Option<String> {
    match port_type {
        SerialPortType::UsbPort(usb) => Some(
            usb.product
                .clone()
                .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
        ),
        SerialPortType::BluetoothPort => Some("Bluetooth".to_string()),
        SerialPortType::PciPort => Some("PCI".to_string()),
        SerialPortType::Unknown => None,
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn start_scan(&self) -> Result<(), TransportError> {
        let ports =
            tokio_serial::available_ports().map_err(|e| TransportError::ScanFailed(e.to_string()))?;
        info!("Found {} serial ports", ports.len());

        for port in ports {
            let device = DeviceHandle::new(port.port_name, describe(&port.port_type));
            debug!("Serial port {} ({:?})", device.id, device.name);
            let _ = self.events.send(TransportEvent::DeviceFound(device));
        }
        Ok(())
    }

    async fn stop_scan(&self) {}

    async fn connect(&self, device: &DeviceHandle) -> Result<(), TransportError> {
        self.channel
            .attach(&device.id, self.baud_rate)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                device: device.id.clone(),
                reason: e.to_string(),
            })?;
        self.linked.store(true, Ordering::SeqCst);
        self.replace_watchdog(Some(self.spawn_watchdog()));
        Ok(())
    }

    async fn disconnect(&self) {
        self.linked.store(false, Ordering::SeqCst);
        self.replace_watchdog(None);
        self.channel.detach().await;
    }

    fn is_connected(&self) -> bool {
        self.channel.is_open()
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    fn channel(&self) -> Arc<dyn CommandChannel> {
        self.channel.clone()
    }
}
