//! DPF Monitor Daemon
//!
//! Runs the regeneration monitor against an ELM327 adapter on a serial
//! port and reports every monitor event through the log.

mod serial_transport;
mod settings;

pub use serial_transport::SerialTransport;
pub use settings::{DaemonConfig, SerialConfig, DEFAULT_CONFIG_PATH};

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use dpf_monitor::{
    DeviceHandle, DeviceStore, DpfMonitor, JsonFileDeviceStore, MonitorEvent, Notifier,
    NotifierCapability,
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "dpfd=info,dpf_monitor=info,vag_protocol=info,obd_protocol=info";

/// Initialize logging
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Notifications rendered as log lines
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn alert(&self, title: &str, body: &str) -> bool {
        warn!("[ALERT] {}: {}", title, body);
        true
    }

    async fn show_persistent(&self, title: &str, body: &str) -> bool {
        info!("[ONGOING] {}: {}", title, body);
        true
    }

    async fn dismiss_persistent(&self) -> bool {
        true
    }
}

/// Run until Ctrl-C or until the adapter link drops
pub async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    let transport = Arc::new(SerialTransport::new(&config.serial));
    let store = Arc::new(JsonFileDeviceStore::new(config.state_file.clone()));
    let monitor = DpfMonitor::new(
        transport,
        store.clone(),
        NotifierCapability::available(Arc::new(LogNotifier)),
        config.monitor.clone(),
    );
    let events = monitor.subscribe();

    let device = select_device(&config, store.as_ref(), &monitor).await?;
    info!("Using adapter {}", device.id);

    if !monitor.connect_to_device(&device).await {
        bail!("could not open adapter at {}", device.id);
    }
    if !monitor.start_monitoring().await {
        monitor.destroy().await;
        bail!("monitoring could not be started on {}", device.id);
    }

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            info!("Interrupted, shutting down");
            Ok(())
        }
        reason = log_events(events) => Err(anyhow!(reason)),
    };

    monitor.destroy().await;
    outcome
}

/// Configured port, else the remembered adapter, else the first scan result
async fn select_device(
    config: &DaemonConfig,
    store: &dyn DeviceStore,
    monitor: &DpfMonitor,
) -> anyhow::Result<DeviceHandle> {
    if let Some(port) = &config.serial.port {
        return Ok(DeviceHandle::new(port.clone(), None));
    }

    match store.load_last_device_id().await {
        Ok(Some(id)) => return Ok(DeviceHandle::new(id, None)),
        Ok(None) => {}
        Err(e) => warn!("Ignoring unreadable state file: {}", e),
    }

    let mut events = monitor.subscribe();
    if !monitor.scan_for_devices().await {
        bail!("serial port scan failed");
    }

    let window = monitor.config().scan_timeout();
    let found = tokio::time::timeout(window, async {
        loop {
            match events.recv().await {
                Ok(MonitorEvent::DeviceFound(device)) => return Some(device),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;

    match found {
        Ok(Some(device)) => Ok(device),
        _ => bail!("no serial adapter found within {:?}", window),
    }
}

/// Log monitor events; returns why monitoring can no longer continue
async fn log_events(mut events: broadcast::Receiver<MonitorEvent>) -> String {
    loop {
        match events.recv().await {
            Ok(MonitorEvent::DpfDataUpdated(data)) => info!(
                "soot {:.2} g ({:.0} %), dpf {:?} °C, exhaust {:?} °C, {:?} km since regen, regenerating {} ({:?}, {:?})",
                data.soot_load,
                data.soot_load_percent,
                data.dpf_temperature,
                data.exhaust_temperature,
                data.distance_since_regen,
                data.is_regenerating,
                data.regen_phase,
                data.mode
            ),
            Ok(MonitorEvent::RegenerationStarted) => warn!("DPF regeneration started"),
            Ok(MonitorEvent::RegenerationEnded) => info!("DPF regeneration finished"),
            Ok(MonitorEvent::Error(message)) => error!("{}", message),
            Ok(MonitorEvent::ConnectionChanged(false)) => {
                return "adapter link lost".to_string();
            }
            Ok(event) => info!("{:?}", event),
            Err(RecvError::Lagged(skipped)) => warn!("Skipped {} monitor events", skipped),
            Err(RecvError::Closed) => return "monitor event stream closed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_events_ends_on_link_loss() {
        let (tx, rx) = broadcast::channel(8);
        tx.send(MonitorEvent::RegenerationStarted).unwrap();
        tx.send(MonitorEvent::ConnectionChanged(true)).unwrap();
        tx.send(MonitorEvent::ConnectionChanged(false)).unwrap();

        assert_eq!(log_events(rx).await, "adapter link lost");
    }

    #[tokio::test]
    async fn test_configured_port_wins() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig {
            serial: SerialConfig {
                port: Some("/dev/ttyUSB0".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let store = JsonFileDeviceStore::new(dir.path().join("state.json"));
        store.save_last_device_id("/dev/rfcomm0").await.unwrap();
        let monitor = DpfMonitor::new(
            Arc::new(SerialTransport::new(&config.serial)),
            Arc::new(JsonFileDeviceStore::new(store.path())),
            NotifierCapability::Unavailable,
            config.monitor.clone(),
        );

        let device = select_device(&config, &store, &monitor).await.unwrap();
        assert_eq!(device.id, "/dev/ttyUSB0");
    }

    #[tokio::test]
    async fn test_remembered_adapter_used() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::default();
        let store = JsonFileDeviceStore::new(dir.path().join("state.json"));
        store.save_last_device_id("/dev/rfcomm0").await.unwrap();
        let monitor = DpfMonitor::new(
            Arc::new(SerialTransport::new(&config.serial)),
            Arc::new(JsonFileDeviceStore::new(store.path())),
            NotifierCapability::Unavailable,
            config.monitor.clone(),
        );

        let device = select_device(&config, &store, &monitor).await.unwrap();
        assert_eq!(device.id, "/dev/rfcomm0");
    }
}
