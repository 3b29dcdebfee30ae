//! DPF Monitor Service
//!
//! Owns the connection lifecycle, the polling task and the regeneration edge
//! tracking. All mutable state sits behind one async mutex; the poll task,
//! the scan timer and the transport event bridge each take it for the whole
//! of their step, so ECU traffic is strictly sequential.

use crate::config::MonitorConfig;
use crate::edge::{RegenEdge, RegenEdgeTracker};
use crate::events::MonitorEvent;
use crate::notify::NotifierCapability;
use crate::state::MonitoringState;
use crate::store::DeviceStore;
use crate::transport::{DeviceHandle, Transport, TransportEvent};
use obd_protocol::{AdapterIdentity, AdapterSession};
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use vag_protocol::{DpfData, VagSession};

const NOT_CONNECTED: &str = "Not connected to an OBD-II adapter";
const ADAPTER_INIT_FAILED: &str = "Failed to initialize the ELM327 adapter";
const PROTOCOL_INIT_FAILED: &str = "Failed to initialize the VAG diagnostic session";

#[derive(Default)]
struct Core {
    state: MonitoringState,
    session: Option<VagSession>,
    identity: Option<AdapterIdentity>,
    edges: RegenEdgeTracker,
    poll_task: Option<JoinHandle<()>>,
    scan_timer: Option<JoinHandle<()>>,
    in_background: bool,
    /// Monitoring was running when the app went to the background
    resume_on_foreground: bool,
    last_device_id: Option<String>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    store: Arc<dyn DeviceStore>,
    notifier: NotifierCapability,
    config: MonitorConfig,
    events: broadcast::Sender<MonitorEvent>,
    core: Mutex<Core>,
    bridge: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the DPF monitor service. Clones share one service.
#[derive(Clone)]
pub struct DpfMonitor {
    shared: Arc<Shared>,
}

impl DpfMonitor {
    /// Create the service and start listening to transport events.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn DeviceStore>,
        notifier: NotifierCapability,
        config: MonitorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let transport_events = transport.subscribe();
        if !notifier.is_available() {
            info!("Notifications unavailable, background alerts disabled");
        }

        let shared = Arc::new(Shared {
            transport,
            store,
            notifier,
            config,
            events,
            core: Mutex::new(Core::default()),
            bridge: std::sync::Mutex::new(None),
        });

        let bridge = tokio::spawn(bridge_transport_events(
            Arc::downgrade(&shared),
            transport_events,
        ));
        *shared.bridge.lock().unwrap_or_else(PoisonError::into_inner) = Some(bridge);

        Self { shared }
    }

    /// Subscribe to monitor events
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.events.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    /// Start discovering adapters.
    ///
    /// Moves to `Connecting`; if nothing is connected when the scan timeout
    /// expires the monitor returns to `Idle`.
    pub async fn scan_for_devices(&self) -> bool {
        let mut core = self.shared.core.lock().await;
        self.shared.begin_scan(&mut core, true).await
    }

    /// Connect to a discovered adapter. Does not start monitoring.
    pub async fn connect_to_device(&self, device: &DeviceHandle) -> bool {
        let mut core = self.shared.core.lock().await;
        self.shared.connect_locked(&mut core, device).await
    }

    /// Initialize the adapter and ECU session, then start polling
    pub async fn start_monitoring(&self) -> bool {
        let mut core = self.shared.core.lock().await;
        self.shared.start_locked(&mut core).await
    }

    /// Stop polling and return to `Idle`
    pub async fn stop_monitoring(&self) {
        let mut core = self.shared.core.lock().await;
        self.shared.stop_locked(&mut core).await;
    }

    /// Stop monitoring and close the link
    pub async fn disconnect(&self) {
        let mut core = self.shared.core.lock().await;
        cancel_scan_timer(&mut core);
        self.shared.stop_locked(&mut core).await;
        self.shared.transport.disconnect().await;
        self.shared.emit(MonitorEvent::ConnectionChanged(false));
        info!("Disconnected from adapter");
    }

    /// The app is no longer visible
    pub async fn on_app_background(&self) {
        let mut core = self.shared.core.lock().await;
        core.in_background = true;
        core.resume_on_foreground = core.state.is_monitoring();

        if !core.state.is_monitoring() {
            return;
        }

        let body = match core.session.as_ref().and_then(VagSession::last_dpf_data) {
            Some(data) => format!("Soot load {:.0} %", data.soot_load_percent),
            None => "Waiting for the first reading".to_string(),
        };
        if !self
            .shared
            .notifier
            .show_persistent("DPF monitoring active", &body)
            .await
        {
            debug!("Persistent notification not shown");
        }

        if core.edges.is_regenerating() {
            self.shared.alert_regeneration().await;
        }
    }

    /// The app is visible again.
    ///
    /// If monitoring was running when the app left and the link has since
    /// dropped, scans for the last adapter for the reconnect timeout and
    /// restarts monitoring on it.
    pub async fn on_app_foreground(&self) {
        let reconnect = {
            let mut core = self.shared.core.lock().await;
            core.in_background = false;
            self.shared.notifier.dismiss_persistent().await;
            let resume = std::mem::take(&mut core.resume_on_foreground);
            resume && !self.shared.transport.is_connected()
        };

        if reconnect {
            self.reconnect_last_device().await;
        }
    }

    async fn reconnect_last_device(&self) -> bool {
        let stored = match self.shared.store.load_last_device_id().await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to load last device id: {}", e);
                None
            }
        };

        let mut core = self.shared.core.lock().await;
        let Some(device_id) = stored.or_else(|| core.last_device_id.clone()) else {
            info!("No known adapter to reconnect to");
            self.shared.set_state(&mut core, MonitoringState::Idle);
            return false;
        };

        info!("Reconnecting to {}", device_id);
        let mut events = self.shared.transport.subscribe();
        if !self.shared.begin_scan(&mut core, false).await {
            return false;
        }
        drop(core);

        let window = self.shared.config.reconnect_timeout();
        let found = tokio::time::timeout(window, wait_for_device(&mut events, &device_id)).await;

        match found {
            Ok(Some(device)) => {
                let mut core = self.shared.core.lock().await;
                self.shared.connect_locked(&mut core, &device).await
                    && self.shared.start_locked(&mut core).await
            }
            _ => {
                warn!("Adapter {} not found within {:?}", device_id, window);
                let mut core = self.shared.core.lock().await;
                self.shared.transport.stop_scan().await;
                self.shared.set_state(&mut core, MonitoringState::Idle);
                false
            }
        }
    }

    /// Tear the service down: stop everything and close the link
    pub async fn destroy(&self) {
        let mut core = self.shared.core.lock().await;
        cancel_scan_timer(&mut core);
        self.shared.stop_locked(&mut core).await;
        self.shared.transport.stop_scan().await;
        self.shared.transport.disconnect().await;
        core.session = None;

        let bridge = self
            .shared
            .bridge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(bridge) = bridge {
            bridge.abort();
        }
        info!("DPF monitor destroyed");
    }

    /// Current lifecycle state
    pub async fn state(&self) -> MonitoringState {
        self.shared.core.lock().await.state
    }

    /// Check if the ECU is being polled
    pub async fn is_monitoring(&self) -> bool {
        self.state().await.is_monitoring()
    }

    /// Whether the transport link is up
    pub fn is_connected(&self) -> bool {
        self.shared.transport.is_connected()
    }

    /// Identity reported by the adapter at the last initialization
    pub async fn adapter_identity(&self) -> Option<AdapterIdentity> {
        self.shared.core.lock().await.identity.clone()
    }

    /// Most recent reading
    pub async fn last_dpf_data(&self) -> Option<Arc<DpfData>> {
        self.shared
            .core
            .lock()
            .await
            .session
            .as_ref()
            .and_then(VagSession::last_dpf_data)
    }
}

impl Shared {
    fn emit(&self, event: MonitorEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    fn set_state(&self, core: &mut Core, state: MonitoringState) {
        if core.state != state {
            info!("Monitoring state {} -> {}", core.state, state);
        }
        core.state = state;
        self.emit(MonitorEvent::StateChanged(state));
    }

    fn fail(&self, core: &mut Core, message: &str) {
        error!("{}", message);
        self.emit(MonitorEvent::Error(message.to_string()));
        self.set_state(core, MonitoringState::Error);
    }

    async fn begin_scan(self: &Arc<Self>, core: &mut Core, arm_timer: bool) -> bool {
        cancel_scan_timer(core);
        self.set_state(core, MonitoringState::Connecting);

        if let Err(e) = self.transport.start_scan().await {
            error!("Scan failed: {}", e);
            self.emit(MonitorEvent::Error(format!("Scan failed: {e}")));
            self.set_state(core, MonitoringState::Idle);
            return false;
        }

        if arm_timer {
            let shared = Arc::downgrade(self);
            let timeout = self.config.scan_timeout();
            core.scan_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(shared) = shared.upgrade() {
                    shared.expire_scan().await;
                }
            }));
        }
        true
    }

    async fn expire_scan(&self) {
        let mut core = self.core.lock().await;
        core.scan_timer = None;
        self.transport.stop_scan().await;
        if core.state == MonitoringState::Connecting && !self.transport.is_connected() {
            info!("Scan timed out without a connection");
            self.set_state(&mut core, MonitoringState::Idle);
        }
    }

    async fn connect_locked(&self, core: &mut Core, device: &DeviceHandle) -> bool {
        cancel_scan_timer(core);
        self.transport.stop_scan().await;
        self.set_state(core, MonitoringState::Connecting);

        if let Err(e) = self.transport.connect(device).await {
            warn!("Connection to {} failed: {}", device.id, e);
            self.emit(MonitorEvent::Error(format!("Connection failed: {e}")));
            self.set_state(core, MonitoringState::Idle);
            return false;
        }

        info!("Connected to adapter {}", device.id);
        core.last_device_id = Some(device.id.clone());
        if let Err(e) = self.store.save_last_device_id(&device.id).await {
            warn!("Failed to save last device id: {}", e);
        }
        self.emit(MonitorEvent::ConnectionChanged(true));
        self.set_state(core, MonitoringState::Idle);
        true
    }

    async fn start_locked(self: &Arc<Self>, core: &mut Core) -> bool {
        if !self.transport.is_connected() {
            warn!("Monitoring requested without a connected adapter");
            self.emit(MonitorEvent::Error(NOT_CONNECTED.to_string()));
            return false;
        }
        if core.state.is_monitoring() {
            debug!("Monitoring already running");
            return true;
        }

        self.set_state(core, MonitoringState::Initializing);

        let mut adapter = AdapterSession::new(self.transport.channel(), self.config.adapter.clone());
        if !adapter.initialize().await {
            self.fail(core, ADAPTER_INIT_FAILED);
            return false;
        }
        core.identity = adapter.identity().cloned();

        let mut session = VagSession::new(adapter, self.config.detector.clone());
        if !session.initialize().await {
            self.fail(core, PROTOCOL_INIT_FAILED);
            return false;
        }

        core.session = Some(session);
        core.edges.reset();
        if let Some(task) = core.poll_task.take() {
            task.abort();
        }
        core.poll_task = Some(tokio::spawn(poll_loop(
            Arc::downgrade(self),
            self.config.poll_interval(),
        )));
        self.set_state(core, MonitoringState::Monitoring);
        true
    }

    async fn stop_locked(&self, core: &mut Core) {
        if let Some(task) = core.poll_task.take() {
            task.abort();
        }
        self.set_state(core, MonitoringState::Idle);
        self.notifier.dismiss_persistent().await;
    }

    /// One poll cycle. Returns `false` once polling should end.
    async fn poll_once(&self) -> bool {
        let mut core = self.core.lock().await;
        if !core.state.is_monitoring() {
            return false;
        }
        let Some(session) = core.session.as_mut() else {
            return false;
        };
        let Some(data) = session.read_dpf_data().await else {
            debug!("Poll produced no reading");
            return true;
        };

        self.emit(MonitorEvent::DpfDataUpdated(data.clone()));

        match core.edges.observe(data.is_regenerating) {
            Some(RegenEdge::Started) => {
                info!(
                    "DPF regeneration started ({:?}, soot {:.2} g)",
                    data.regen_phase, data.soot_load
                );
                self.emit(MonitorEvent::RegenerationStarted);
                if core.in_background {
                    self.alert_regeneration().await;
                }
            }
            Some(RegenEdge::Ended) => {
                info!("DPF regeneration ended (soot {:.2} g)", data.soot_load);
                self.emit(MonitorEvent::RegenerationEnded);
            }
            None => {}
        }
        true
    }

    async fn alert_regeneration(&self) {
        let shown = self
            .notifier
            .alert(
                "DPF regeneration in progress",
                "Keep driving at a steady speed until the regeneration completes",
            )
            .await;
        if !shown {
            warn!("Regeneration alert could not be shown");
        }
    }
}

fn cancel_scan_timer(core: &mut Core) {
    if let Some(timer) = core.scan_timer.take() {
        timer.abort();
    }
}

async fn poll_loop(shared: Weak<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if !shared.poll_once().await {
            break;
        }
    }
    debug!("Poll loop finished");
}

async fn bridge_transport_events(
    shared: Weak<Shared>,
    mut events: broadcast::Receiver<TransportEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} transport events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(shared) = shared.upgrade() else {
            break;
        };

        match event {
            TransportEvent::DeviceFound(device) => {
                debug!("Found adapter {} ({:?})", device.id, device.name);
                shared.emit(MonitorEvent::DeviceFound(device));
            }
            TransportEvent::Error(message) => shared.emit(MonitorEvent::Error(message)),
            TransportEvent::LinkLost => {
                warn!("Adapter link lost");
                shared.emit(MonitorEvent::ConnectionChanged(false));
                let mut core = shared.core.lock().await;
                if core.state.is_monitoring() {
                    shared.stop_locked(&mut core).await;
                }
            }
        }
    }
}

async fn wait_for_device(
    events: &mut broadcast::Receiver<TransportEvent>,
    device_id: &str,
) -> Option<DeviceHandle> {
    loop {
        match events.recv().await {
            Ok(TransportEvent::DeviceFound(device)) if device.id == device_id => {
                return Some(device)
            }
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return None,
        }
    }
}
