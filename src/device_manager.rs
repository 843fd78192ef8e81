//! Device manager for the MJ_HT_V1 sensor session.
//!
//! Owns the scanner, the bridge and the single sensor session. One driver
//! task consumes a mailbox of commands, scan matches and session events;
//! every state transition and every touch of the transport handle happens
//! serialized on that task.

use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::ble::characteristics;
use crate::ble::scanner::{BleScanner, DeviceFilter};
use crate::ble::session::{Session, SessionAction, SessionConfig, SessionEvent, SessionState};
use crate::bridge::{Bridge, Command, UiEvent};
use crate::data::{BatteryLevel, ReadingUpdate, SensorReading};
use crate::error::{Error, Result};
use crate::permissions::{ensure_granted, AlwaysGranted, PermissionCheck};

/// Capacity of the driver mailbox.
const MAILBOX_CAPACITY: usize = 64;

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Everything that can land in the driver mailbox.
enum DriverInput {
    /// The scanner claimed a matching advertisement.
    Matched {
        identifier: String,
        peripheral: Peripheral,
    },
    /// The platform reported a peripheral disconnect.
    Disconnected { identifier: String },
    /// A session event from a producer task (timer, notification pump).
    Session(SessionEvent),
    /// Tear the session down and end the driver.
    Shutdown,
}

/// Central manager for one MJ_HT_V1 sensor session.
///
/// A manager drives at most one lifecycle: [`DeviceManager::start`] spawns
/// the driver, [`DeviceManager::shutdown`] ends it for good. A new scan
/// command while a session is underway force-closes the old session and
/// starts a fresh one — a closed session is never resurrected.
pub struct DeviceManager {
    /// BLE scanner.
    scanner: Arc<BleScanner>,
    /// Bridge to the observer.
    bridge: Arc<Bridge>,
    /// Session parameters.
    config: SessionConfig,
    /// Platform authorization gate.
    permission_check: Arc<dyn PermissionCheck>,
    /// Mirror of the driver's session state, for queries.
    session_state: Arc<RwLock<SessionState>>,
    /// The active transport handle. The driver is the only writer.
    handle: Arc<RwLock<Option<Peripheral>>>,
    /// Mailbox sender shared with producer tasks.
    input_tx: mpsc::Sender<DriverInput>,
    /// Receivers handed to the driver on start.
    rx_slots: RwLock<Option<(mpsc::Receiver<DriverInput>, mpsc::Receiver<Command>)>>,
    /// Parsed reading fan-out.
    reading_tx: broadcast::Sender<ReadingUpdate>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
    /// Driver task handle.
    driver_handle: RwLock<Option<JoinHandle<()>>>,
    /// Adapter event watcher task handle.
    watcher_handle: RwLock<Option<JoinHandle<()>>>,
    /// Running flag.
    is_running: Arc<AtomicBool>,
}

impl DeviceManager {
    /// Create a new DeviceManager instance.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let scanner = BleScanner::new().await?;
        Ok(Self::from_scanner(scanner))
    }

    /// Create a new DeviceManager with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self::from_scanner(BleScanner::with_adapter(adapter))
    }

    fn from_scanner(scanner: BleScanner) -> Self {
        let (bridge, command_rx) = Bridge::new();
        let (input_tx, input_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (reading_tx, _) = broadcast::channel(64);

        Self {
            scanner: Arc::new(scanner),
            bridge: Arc::new(bridge),
            config: SessionConfig::default(),
            permission_check: Arc::new(AlwaysGranted),
            session_state: Arc::new(RwLock::new(SessionState::Idle)),
            handle: Arc::new(RwLock::new(None)),
            input_tx,
            rx_slots: RwLock::new(Some((input_rx, command_rx))),
            reading_tx,
            callback_counter: AtomicU64::new(0),
            driver_handle: RwLock::new(None),
            watcher_handle: RwLock::new(None),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the session configuration. Call before [`Self::start`].
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Install a platform permission check. Call before [`Self::start`].
    pub fn with_permission_check(mut self, check: Arc<dyn PermissionCheck>) -> Self {
        self.permission_check = check;
        self
    }

    /// Spawn the driver and the adapter event watcher.
    ///
    /// Idempotent while running; a manager that has been shut down does
    /// not restart.
    pub async fn start(&self) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            debug!("Already started");
            return Ok(());
        }

        let Some((input_rx, command_rx)) = self.rx_slots.write().take() else {
            debug!("Driver already ran, ignoring start request");
            self.is_running.store(false, Ordering::SeqCst);
            return Ok(());
        };

        info!("Starting device manager");

        let watcher = tokio::spawn(run_watcher(
            self.scanner.adapter().clone(),
            self.scanner.clone(),
            self.input_tx.clone(),
            self.is_running.clone(),
        ));
        *self.watcher_handle.write() = Some(watcher);

        let driver = Driver {
            scanner: self.scanner.clone(),
            bridge: self.bridge.clone(),
            config: self.config.clone(),
            permission_check: self.permission_check.clone(),
            session: Session::new(),
            session_state: self.session_state.clone(),
            pending: None,
            handle: self.handle.clone(),
            target: None,
            pump: None,
            input_tx: self.input_tx.clone(),
            reading_tx: self.reading_tx.clone(),
        };
        let handle = tokio::spawn(driver.run(input_rx, command_rx));
        *self.driver_handle.write() = Some(handle);

        Ok(())
    }

    /// Request a scan for the configured sensor.
    ///
    /// Equivalent to sending [`Command::StartScan`] over the bridge, with
    /// the permission refusal surfaced as an error instead of a notice.
    /// Scan failures past this point are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] when the platform authorization
    /// is missing.
    pub async fn start_scan(&self) -> Result<()> {
        ensure_granted(self.permission_check.as_ref()).await?;
        self.bridge.send_command(Command::StartScan);
        Ok(())
    }

    /// Tear the current session down.
    ///
    /// Idempotent: with no session underway this is a no-op.
    pub async fn stop_scan(&self) -> Result<()> {
        self.input_tx
            .send(DriverInput::Session(SessionEvent::TeardownRequested))
            .await
            .map_err(|_| Error::ScanFailed {
                reason: "session driver is not running".to_string(),
            })
    }

    /// Get the bridge for observer registration and commands.
    pub fn bridge(&self) -> Arc<Bridge> {
        self.bridge.clone()
    }

    /// Current session state.
    pub fn session_state(&self) -> SessionState {
        *self.session_state.read()
    }

    /// Check if scanning is active.
    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// The active session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribe to parsed reading updates.
    pub fn subscribe_readings(&self) -> broadcast::Receiver<ReadingUpdate> {
        self.reading_tx.subscribe()
    }

    /// Register a callback for parsed readings.
    pub fn on_reading<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(ReadingUpdate) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.reading_tx.subscribe();

        let handle = tokio::spawn(async move {
            while let Ok(update) = rx.recv().await {
                callback(update);
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Read the sensor's battery level over the active connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when no transport handle is active.
    pub async fn read_battery_level(&self) -> Result<BatteryLevel> {
        let peripheral = self.handle.read().clone().ok_or(Error::NotConnected)?;
        let data = characteristics::read_battery_level(&peripheral).await?;
        BatteryLevel::from_bytes(&data)
    }

    /// Clean shutdown: tear the session down and end the driver.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down device manager");

        self.is_running.store(false, Ordering::SeqCst);

        let _ = self.input_tx.send(DriverInput::Shutdown).await;

        let driver = self.driver_handle.write().take();
        if let Some(driver) = driver {
            let _ = driver.await;
        }

        let watcher = self.watcher_handle.write().take();
        if let Some(watcher) = watcher {
            watcher.abort();
        }

        self.scanner.stop_scan().await?;

        Ok(())
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("session_state", &self.session_state())
            .field("is_scanning", &self.is_scanning())
            .finish()
    }
}

/// The session driver. Exclusive owner of the session and, through the
/// shared slot, of the transport handle.
struct Driver {
    scanner: Arc<BleScanner>,
    bridge: Arc<Bridge>,
    config: SessionConfig,
    permission_check: Arc<dyn PermissionCheck>,
    session: Session,
    session_state: Arc<RwLock<SessionState>>,
    /// Matched but not yet connected peripheral.
    pending: Option<Peripheral>,
    /// The live transport handle. Written only here, on this task.
    handle: Arc<RwLock<Option<Peripheral>>>,
    /// The armed sensor characteristic, for symmetric teardown.
    target: Option<Characteristic>,
    /// Notification pump task.
    pump: Option<JoinHandle<()>>,
    input_tx: mpsc::Sender<DriverInput>,
    reading_tx: broadcast::Sender<ReadingUpdate>,
}

impl Driver {
    async fn run(
        mut self,
        mut input_rx: mpsc::Receiver<DriverInput>,
        mut command_rx: mpsc::Receiver<Command>,
    ) {
        debug!("Session driver started");

        loop {
            tokio::select! {
                Some(input) = input_rx.recv() => {
                    if matches!(input, DriverInput::Shutdown) {
                        self.feed(SessionEvent::TeardownRequested).await;
                        break;
                    }
                    self.handle_input(input).await;
                }
                Some(command) = command_rx.recv() => {
                    self.handle_command(command).await;
                }
                else => break,
            }
        }

        debug!("Session driver ended");
    }

    async fn handle_input(&mut self, input: DriverInput) {
        match input {
            DriverInput::Matched {
                identifier,
                peripheral,
            } => {
                self.pending = Some(peripheral);
                self.feed(SessionEvent::DeviceMatched { identifier }).await;
            }
            DriverInput::Disconnected { identifier } => {
                let ours = self.session.device_id() == Some(identifier.as_str());
                if ours && self.session.state().holds_handle() {
                    info!("sensor {} disconnected", identifier);
                    self.feed(SessionEvent::PeerDisconnected).await;
                } else {
                    trace!("ignoring disconnect of unrelated peripheral {}", identifier);
                }
            }
            DriverInput::Session(event) => self.feed(event).await,
            DriverInput::Shutdown => unreachable!("handled in run"),
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartScan => {
                if !self.permission_check.is_granted().await {
                    warn!("refusing scan: permission not granted");
                    self.bridge
                        .send(UiEvent::UiNotice("Bluetooth permission required".to_string()));
                    return;
                }

                if self.session.state() != SessionState::Idle && !self.session.is_closed() {
                    info!("force-closing existing session before a new scan");
                    self.feed(SessionEvent::TeardownRequested).await;
                }

                // Fresh session per start command; the closed one is gone.
                self.session = Session::new();
                self.pending = None;
                *self.session_state.write() = SessionState::Idle;

                self.feed(SessionEvent::StartRequested).await;
            }
        }
    }

    /// Feed one event through the machine and execute its actions.
    async fn feed(&mut self, event: SessionEvent) {
        // The handle becomes live together with the Connected state.
        if matches!(event, SessionEvent::ConnectSucceeded) {
            if let Some(peripheral) = self.pending.take() {
                *self.handle.write() = Some(peripheral);
            }
        }

        let before = self.session.state();
        let actions = self.session.apply(event);
        let after = self.session.state();
        *self.session_state.write() = after;

        if before != after {
            if after == SessionState::Scanning {
                self.bridge.send(UiEvent::ScanningStarted);
            }
            if before == SessionState::Scanning {
                self.bridge.send(UiEvent::ScanningStopped);
            }
        }

        for action in actions {
            self.execute(action).await;
        }
    }

    async fn execute(&mut self, action: SessionAction) {
        match action {
            SessionAction::BeginScan => {
                let filter = DeviceFilter::new(self.config.device_name.clone());
                if let Err(e) = self.scanner.start_scan(filter).await {
                    // No automatic retry; the next StartScan command
                    // force-closes this session and tries again.
                    error!("scan start failed: {}", e);
                }
            }
            SessionAction::HaltScan => {
                if let Err(e) = self.scanner.stop_scan().await {
                    warn!("scan stop failed: {}", e);
                }
            }
            SessionAction::Connect { identifier } => {
                let Some(peripheral) = self.pending.clone() else {
                    error!("matched candidate lost before connect");
                    self.queue(SessionEvent::ConnectFailed {
                        reason: "matched candidate lost".to_string(),
                    });
                    return;
                };

                info!("connecting to {}", identifier);
                match peripheral.connect().await {
                    Ok(()) => self.queue(SessionEvent::ConnectSucceeded),
                    Err(e) => {
                        error!("connect to {} failed: {}", identifier, e);
                        self.queue(SessionEvent::ConnectFailed {
                            reason: e.to_string(),
                        });
                    }
                }
            }
            SessionAction::ScheduleDiscovery => {
                let tx = self.input_tx.clone();
                let delay = self.config.settle_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx
                        .send(DriverInput::Session(SessionEvent::SettleElapsed))
                        .await;
                });
            }
            SessionAction::DiscoverServices => {
                let peripheral = self.handle.read().clone();
                let Some(peripheral) = peripheral else {
                    self.queue(SessionEvent::DiscoveryFailed {
                        reason: "no active handle".to_string(),
                    });
                    return;
                };

                info!("discovering services");
                match peripheral.discover_services().await {
                    Ok(()) => self.queue(SessionEvent::ServicesDiscovered),
                    Err(e) => {
                        error!("service discovery failed: {}", e);
                        self.queue(SessionEvent::DiscoveryFailed {
                            reason: e.to_string(),
                        });
                    }
                }
            }
            SessionAction::ArmNotifications => match self.arm_notifications().await {
                Ok(()) => self.queue(SessionEvent::NotificationsArmed),
                Err(e @ (Error::ServiceNotFound { .. } | Error::CharacteristicNotFound { .. })) => {
                    // Target absent: no fallback path, the session stays
                    // parked in SubscribingNotifications.
                    error!("cannot arm notifications: {}", e);
                }
                Err(e) => {
                    error!("failed to arm notifications: {}", e);
                    self.queue(SessionEvent::SubscribeFailed {
                        reason: e.to_string(),
                    });
                }
            },
            SessionAction::ForwardReading { data } => match SensorReading::from_bytes(&data) {
                Ok(reading) => {
                    debug!("reading: {}", reading);
                    let _ = self.reading_tx.send(ReadingUpdate::now(reading));
                    self.bridge.send(UiEvent::SensorData(reading.encode()));
                }
                Err(e) => {
                    // Dropped; streaming continues with the next payload.
                    warn!("{}", e);
                }
            },
            SessionAction::ReleaseHandle => self.release_handle().await,
            SessionAction::Notice { text } => self.bridge.send(UiEvent::UiNotice(text)),
        }
    }

    /// Locate the sensor characteristic, enable delivery on it, and start
    /// the notification pump.
    async fn arm_notifications(&mut self) -> Result<()> {
        let peripheral = self.handle.read().clone().ok_or(Error::NotConnected)?;

        let characteristic = characteristics::find_characteristic(
            &peripheral,
            self.config.service_uuid,
            self.config.characteristic_uuid,
        )?;

        characteristics::enable_notifications(&peripheral, &characteristic).await?;

        let mut stream = peripheral.notifications().await.map_err(Error::Bluetooth)?;
        let uuid = characteristic.uuid;
        let tx = self.input_tx.clone();

        let pump = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid != uuid {
                    continue;
                }
                let event = SessionEvent::PayloadReceived {
                    data: notification.value,
                };
                if tx.send(DriverInput::Session(event)).await.is_err() {
                    break;
                }
            }
            debug!("notification pump ended");
        });

        self.pump = Some(pump);
        self.target = Some(characteristic);

        Ok(())
    }

    /// Release the transport handle. Runs at most once per session: the
    /// slot is taken, so a second release finds nothing.
    async fn release_handle(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        let released = self.handle.write().take();
        self.pending = None;
        let target = self.target.take();

        if let Some(peripheral) = released {
            if let Some(characteristic) = target {
                // Best effort; the peer may already be gone.
                if let Err(e) =
                    characteristics::disable_notifications(&peripheral, &characteristic).await
                {
                    debug!("disable on release failed: {}", e);
                }
            }
            if let Err(e) = peripheral.disconnect().await {
                debug!("disconnect on release failed: {}", e);
            }
            info!("transport handle released");
        }

        if self.session.state() == SessionState::Disconnected {
            self.queue(SessionEvent::HandleReleased);
        }
    }

    /// Queue a session event back into the mailbox.
    fn queue(&self, event: SessionEvent) {
        if self
            .input_tx
            .try_send(DriverInput::Session(event))
            .is_err()
        {
            warn!("driver mailbox full, dropping session event");
        }
    }
}

/// Watch adapter events for the life of the manager.
///
/// Advertisements are only evaluated while a scan is active; disconnect
/// events are always forwarded so the driver can correlate them against
/// the current session.
async fn run_watcher(
    adapter: Adapter,
    scanner: Arc<BleScanner>,
    input_tx: mpsc::Sender<DriverInput>,
    is_running: Arc<AtomicBool>,
) {
    let mut events = match adapter.events().await {
        Ok(events) => events,
        Err(e) => {
            error!("Failed to get adapter events: {}", e);
            return;
        }
    };

    while is_running.load(Ordering::SeqCst) {
        tokio::select! {
            Some(event) = events.next() => {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        if scanner.is_scanning() {
                            process_advertisement(&adapter, id, &scanner, &input_tx).await;
                        }
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        let _ = input_tx
                            .send(DriverInput::Disconnected {
                                identifier: id.to_string(),
                            })
                            .await;
                    }
                    _ => {}
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                // Check if we should stop watching
                if !is_running.load(Ordering::SeqCst) {
                    break;
                }
            }
        }
    }

    debug!("Adapter event watcher ended");
}

/// Evaluate one advertisement against the scan filter.
async fn process_advertisement(
    adapter: &Adapter,
    id: PeripheralId,
    scanner: &Arc<BleScanner>,
    input_tx: &mpsc::Sender<DriverInput>,
) {
    let peripheral = match adapter.peripheral(&id).await {
        Ok(p) => p,
        Err(e) => {
            trace!("Failed to get peripheral: {}", e);
            return;
        }
    };

    let properties = match peripheral.properties().await {
        Ok(Some(p)) => p,
        _ => return,
    };

    let name = properties.local_name;
    if scanner.claim_match(name.as_deref()) {
        info!("matched advertisement: {:?} ({})", name, id);
        let _ = input_tx
            .send(DriverInput::Matched {
                identifier: id.to_string(),
                peripheral,
            })
            .await;
    }
}
