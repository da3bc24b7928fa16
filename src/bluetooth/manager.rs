use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::delegate::{DelegateId, DelegateRegistry};
use crate::error::{HermesError, Result};
use crate::sensing::SamplePublisher;
use crate::timer::{Tick, TimerSlot};

use super::central::{CentralBackend, CentralEvent, CentralState, ConnectOptions, Peripheral};
use super::ranking::{rank_peripherals, RankedPeripheral};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, PartialEq)]
pub enum BluetoothEvent {
    /// Published every ranking tick while the central is powered on.
    PeripheralListUpdate(Vec<RankedPeripheral>),
    /// The connected list changed; carries the new list.
    PeripheralsChanged(Vec<Peripheral>),
    /// Outcome of one `connect` call.
    ConnectionAttemptResult {
        peripheral: Peripheral,
        result: std::result::Result<(), HermesError>,
    },
}

enum Command {
    StartScan { reply: oneshot::Sender<()> },
    StopScan { reply: oneshot::Sender<()> },
    Connect { peripheral: Peripheral, options: ConnectOptions },
    Disconnect { peripheral: Peripheral },
    IsConnected { identifier: Uuid, reply: oneshot::Sender<bool> },
    Rssi { identifier: Uuid, reply: oneshot::Sender<Option<i16>> },
    Connected { reply: oneshot::Sender<Vec<Peripheral>> },
    IsScanning { reply: oneshot::Sender<bool> },
}

struct Discovered {
    peripheral: Peripheral,
    rssi: Option<i16>,
}

struct CentralWorker {
    backend: Arc<dyn CentralBackend>,
    central_state: CentralState,
    scanning: bool,
    discovered: HashMap<Uuid, Discovered>,
    connected: Vec<Peripheral>,
    ranking_timer: TimerSlot,
    ticks_tx: mpsc::UnboundedSender<Tick>,
    delegates: Arc<DelegateRegistry<BluetoothEvent>>,
}

/// Scans, ranks and connects peripherals.
///
/// Must be created inside a tokio runtime. Dropping the manager cancels its
/// task and ranking timer.
pub struct BluetoothManager {
    commands: mpsc::UnboundedSender<Command>,
    delegates: Arc<DelegateRegistry<BluetoothEvent>>,
    restore_identifier: Option<String>,
    _worker_guard: DropGuard,
}

fn stopped() -> HermesError {
    HermesError::Internal("bluetooth manager is no longer running".into())
}

impl BluetoothManager {
    /// `restore_identifier` opts into OS state restoration under that key.
    pub fn new(
        backend: Arc<dyn CentralBackend>,
        restore_identifier: Option<String>,
        ranking_interval: Duration,
    ) -> Self {
        let (publisher, events_rx) = SamplePublisher::queue();
        backend.attach(restore_identifier.as_deref(), publisher);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let delegates = Arc::new(DelegateRegistry::new());

        let worker = CentralWorker {
            backend,
            central_state: CentralState::Unknown,
            scanning: false,
            discovered: HashMap::new(),
            connected: Vec::new(),
            ranking_timer: TimerSlot::new(ranking_interval),
            ticks_tx,
            delegates: Arc::clone(&delegates),
        };

        let cancel_token = CancellationToken::new();
        tokio::spawn(central_loop(
            worker,
            commands_rx,
            events_rx,
            ticks_rx,
            cancel_token.clone(),
        ));

        Self {
            commands: commands_tx,
            delegates,
            restore_identifier,
            _worker_guard: cancel_token.drop_guard(),
        }
    }

    pub fn restore_identifier(&self) -> Option<&str> {
        self.restore_identifier.as_deref()
    }

    pub fn register_delegate(&self) -> (DelegateId, mpsc::UnboundedReceiver<BluetoothEvent>) {
        self.delegates.register()
    }

    pub fn unregister_delegate(&self, id: DelegateId) -> bool {
        self.delegates.unregister(id)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| stopped())
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx))?;
        reply_rx.await.map_err(|_| stopped())
    }

    /// Starts scanning (idempotent) and refreshes the connected list from
    /// the OS.
    pub async fn start_scan(&self) -> Result<()> {
        self.request(|reply| Command::StartScan { reply }).await
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.request(|reply| Command::StopScan { reply }).await
    }

    /// Fire-and-forget; the outcome arrives as
    /// [`BluetoothEvent::ConnectionAttemptResult`].
    pub fn connect(
        &self,
        peripheral: &Peripheral,
        notify_on_connection: bool,
        notify_on_disconnection: bool,
    ) -> Result<()> {
        self.send(Command::Connect {
            peripheral: peripheral.clone(),
            options: ConnectOptions {
                notify_on_connection,
                notify_on_disconnection,
            },
        })
    }

    pub fn disconnect(&self, peripheral: &Peripheral) -> Result<()> {
        self.send(Command::Disconnect {
            peripheral: peripheral.clone(),
        })
    }

    pub async fn is_connected(&self, peripheral: &Peripheral) -> Result<bool> {
        let identifier = peripheral.identifier;
        self.request(|reply| Command::IsConnected { identifier, reply })
            .await
    }

    /// Last RSSI reading for the peripheral, if any.
    pub async fn rssi(&self, peripheral: &Peripheral) -> Result<Option<i16>> {
        let identifier = peripheral.identifier;
        self.request(|reply| Command::Rssi { identifier, reply }).await
    }

    pub async fn connected_peripherals(&self) -> Result<Vec<Peripheral>> {
        self.request(|reply| Command::Connected { reply }).await
    }

    pub async fn is_scanning(&self) -> Result<bool> {
        self.request(|reply| Command::IsScanning { reply }).await
    }
}

async fn central_loop(
    mut worker: CentralWorker,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<CentralEvent>,
    mut ticks: mpsc::UnboundedReceiver<Tick>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("bluetooth loop shutting down");
                break;
            }
            // OS callbacks first so queries observe every event delivered
            // before them.
            Some(event) = events.recv() => worker.on_central_event(event),
            command = commands.recv() => match command {
                Some(command) => worker.handle_command(command),
                None => break,
            },
            Some(tick) = ticks.recv() => worker.on_tick(tick),
        }
    }
    worker.ranking_timer.disarm();
}

impl CentralWorker {
    fn notify(&self, event: BluetoothEvent) {
        if !self.delegates.notify(event) {
            log_debug!("no bluetooth delegate registered; event dropped");
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartScan { reply } => {
                self.start_scan();
                let _ = reply.send(());
            }
            Command::StopScan { reply } => {
                if self.scanning {
                    self.backend.stop_scan();
                    self.scanning = false;
                }
                let _ = reply.send(());
            }
            Command::Connect {
                peripheral,
                options,
            } => self.connect(peripheral, options),
            Command::Disconnect { peripheral } => {
                self.backend.cancel_connection(&peripheral);
            }
            Command::IsConnected { identifier, reply } => {
                let connected = self
                    .connected
                    .iter()
                    .any(|peripheral| peripheral.identifier == identifier);
                let _ = reply.send(connected);
            }
            Command::Rssi { identifier, reply } => {
                let rssi = self
                    .discovered
                    .get(&identifier)
                    .and_then(|entry| entry.rssi);
                let _ = reply.send(rssi);
            }
            Command::Connected { reply } => {
                let _ = reply.send(self.connected.clone());
            }
            Command::IsScanning { reply } => {
                let _ = reply.send(self.scanning);
            }
        }
    }

    fn start_scan(&mut self) {
        if !self.scanning {
            self.scanning = true;
            if self.central_state == CentralState::PoweredOn {
                self.backend.scan_for_peripherals();
            }
        }
        self.connected = self.backend.retrieve_connected_peripherals();
    }

    fn connect(&mut self, peripheral: Peripheral, options: ConnectOptions) {
        if self.central_state != CentralState::PoweredOn {
            let reason = format!("central is {:?}", self.central_state);
            log_warn!("cannot connect to {}: {reason}", peripheral.identifier);
            self.notify(BluetoothEvent::ConnectionAttemptResult {
                result: Err(HermesError::ConnectionFailed {
                    peripheral: peripheral.identifier.to_string(),
                    reason,
                }),
                peripheral,
            });
            return;
        }
        self.backend.connect(&peripheral, options);
    }

    fn on_central_event(&mut self, event: CentralEvent) {
        match event {
            CentralEvent::StateChanged(state) => self.on_state(state),
            CentralEvent::Discovered { peripheral, rssi } => {
                let entry = self
                    .discovered
                    .entry(peripheral.identifier)
                    .or_insert_with(|| Discovered {
                        peripheral: peripheral.clone(),
                        rssi: None,
                    });
                entry.peripheral = peripheral;
                if rssi.is_some() {
                    entry.rssi = rssi;
                }
            }
            CentralEvent::Connected(peripheral) => {
                if !self
                    .connected
                    .iter()
                    .any(|existing| existing.identifier == peripheral.identifier)
                {
                    self.connected.push(peripheral.clone());
                }
                log_info!("connected to {}", peripheral.identifier);
                self.notify(BluetoothEvent::PeripheralsChanged(self.connected.clone()));
                self.notify(BluetoothEvent::ConnectionAttemptResult {
                    peripheral,
                    result: Ok(()),
                });
            }
            CentralEvent::FailedToConnect { peripheral, reason } => {
                log_warn!("connection to {} failed: {reason}", peripheral.identifier);
                self.notify(BluetoothEvent::ConnectionAttemptResult {
                    result: Err(HermesError::ConnectionFailed {
                        peripheral: peripheral.identifier.to_string(),
                        reason,
                    }),
                    peripheral,
                });
            }
            CentralEvent::Disconnected { peripheral, reason } => {
                if let Some(reason) = reason {
                    log_info!("{} disconnected: {reason}", peripheral.identifier);
                }
                self.connected
                    .retain(|existing| existing.identifier != peripheral.identifier);
                self.notify(BluetoothEvent::PeripheralsChanged(self.connected.clone()));
            }
            CentralEvent::WillRestoreState {
                peripherals,
                scanning,
            } => {
                log_info!("restoring {} peripheral(s)", peripherals.len());
                self.connected = peripherals
                    .iter()
                    .filter(|restored| restored.connected)
                    .map(|restored| restored.peripheral.clone())
                    .collect();
                for restored in peripherals {
                    self.discovered
                        .entry(restored.peripheral.identifier)
                        .or_insert(Discovered {
                            peripheral: restored.peripheral,
                            rssi: None,
                        });
                }
                self.scanning = scanning;
                self.notify(BluetoothEvent::PeripheralsChanged(self.connected.clone()));
            }
        }
    }

    fn on_state(&mut self, state: CentralState) {
        let previous = self.central_state;
        self.central_state = state;
        if state == previous {
            return;
        }
        log_info!("central state {:?} -> {:?}", previous, state);

        if state == CentralState::PoweredOn {
            self.backend.scan_for_peripherals();
            self.scanning = true;
            self.ranking_timer.arm(&self.ticks_tx);
        } else {
            self.ranking_timer.disarm();
            // The OS stops scanning when the central goes down.
            self.scanning = false;
        }
    }

    fn on_tick(&mut self, tick: Tick) {
        if !self.ranking_timer.accepts(tick) {
            return;
        }
        let ranked = rank_peripherals(
            self.discovered
                .values()
                .map(|entry| (&entry.peripheral, entry.rssi)),
        );
        self.notify(BluetoothEvent::PeripheralListUpdate(ranked));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::central::RestoredPeripheral;
    use crate::bluetooth::simulated::SimulatedCentral;
    use tokio::time::sleep;

    fn peripheral(n: u128, name: &str) -> Peripheral {
        Peripheral {
            identifier: Uuid::from_u128(n),
            name: Some(name.to_string()),
        }
    }

    fn setup() -> (
        BluetoothManager,
        Arc<SimulatedCentral>,
        mpsc::UnboundedReceiver<BluetoothEvent>,
    ) {
        let central = Arc::new(SimulatedCentral::new());
        let manager = BluetoothManager::new(
            central.clone(),
            Some("com.hermes.test".into()),
            Duration::from_secs(1),
        );
        let (_, events) = manager.register_delegate();
        (manager, central, events)
    }

    #[tokio::test(start_paused = true)]
    async fn ranking_publishes_only_peripherals_with_rssi() {
        let (manager, central, mut events) = setup();
        assert_eq!(central.restore_identifier().as_deref(), Some("com.hermes.test"));

        let (p1, p2, p3) = (peripheral(1, "P1"), peripheral(2, "P2"), peripheral(3, "P3"));
        central.set_state(CentralState::PoweredOn);
        central.discover(&p1, Some(-40));
        central.discover(&p2, None);
        central.discover(&p3, Some(-70));

        sleep(Duration::from_millis(1_500)).await;
        match events.recv().await {
            Some(BluetoothEvent::PeripheralListUpdate(ranked)) => {
                let order: Vec<_> = ranked.into_iter().map(|r| r.peripheral).collect();
                assert_eq!(order, vec![p1.clone(), p3.clone()]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(manager.rssi(&p2).await.unwrap(), None);
        assert_eq!(manager.rssi(&p3).await.unwrap(), Some(-70));
        assert!(manager.is_scanning().await.unwrap());
        assert_eq!(central.scan_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_powered_on_cancels_ranking() {
        let (manager, central, mut events) = setup();
        central.set_state(CentralState::PoweredOn);
        sleep(Duration::from_millis(2_500)).await;
        central.set_state(CentralState::PoweredOff);
        assert!(!manager.is_scanning().await.unwrap());

        let mut updates = 0;
        while let Ok(event) = events.try_recv() {
            assert!(matches!(event, BluetoothEvent::PeripheralListUpdate(_)));
            updates += 1;
        }
        assert_eq!(updates, 2);

        sleep(Duration::from_secs(10)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn scan_toggles_are_idempotent_and_refresh_connected() {
        let (manager, central, _events) = setup();
        let watch = peripheral(9, "Watch");
        central.set_connected(vec![watch.clone()]);
        central.set_state(CentralState::PoweredOn);

        manager.start_scan().await.unwrap();
        manager.start_scan().await.unwrap();
        assert_eq!(central.scan_count(), 1);
        assert!(manager.is_connected(&watch).await.unwrap());

        manager.stop_scan().await.unwrap();
        manager.stop_scan().await.unwrap();
        assert_eq!(central.stop_scan_count(), 1);
    }

    #[tokio::test]
    async fn connection_results_are_delivered() {
        let (manager, central, mut events) = setup();
        let heart = peripheral(5, "Heart Rate");
        central.set_state(CentralState::PoweredOn);

        manager.connect(&heart, true, false).unwrap();
        assert_eq!(manager.connected_peripherals().await.unwrap(), vec![]);
        assert_eq!(
            central.connect_requests(),
            vec![(
                heart.clone(),
                ConnectOptions {
                    notify_on_connection: true,
                    notify_on_disconnection: false,
                }
            )]
        );

        central.fail_connection(&heart, "peer removed pairing");
        assert_eq!(
            events.recv().await,
            Some(BluetoothEvent::ConnectionAttemptResult {
                peripheral: heart.clone(),
                result: Err(HermesError::ConnectionFailed {
                    peripheral: heart.identifier.to_string(),
                    reason: "peer removed pairing".into(),
                }),
            })
        );

        manager.connect(&heart, false, false).unwrap();
        central.complete_connection(&heart);
        assert_eq!(
            events.recv().await,
            Some(BluetoothEvent::PeripheralsChanged(vec![heart.clone()]))
        );
        assert_eq!(
            events.recv().await,
            Some(BluetoothEvent::ConnectionAttemptResult {
                peripheral: heart.clone(),
                result: Ok(()),
            })
        );
        assert!(manager.is_connected(&heart).await.unwrap());

        manager.disconnect(&heart).unwrap();
        assert_eq!(
            events.recv().await,
            Some(BluetoothEvent::PeripheralsChanged(vec![]))
        );
        assert!(!manager.is_connected(&heart).await.unwrap());
    }

    #[tokio::test]
    async fn connect_while_powered_off_fails_immediately() {
        let (manager, central, mut events) = setup();
        let heart = peripheral(5, "Heart Rate");
        manager.connect(&heart, false, false).unwrap();

        match events.recv().await {
            Some(BluetoothEvent::ConnectionAttemptResult { result, .. }) => {
                assert!(matches!(result, Err(HermesError::ConnectionFailed { .. })))
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(central.connect_requests().is_empty());
    }

    #[tokio::test]
    async fn restoration_reconciles_connected_list() {
        let (manager, central, mut events) = setup();
        let stale = peripheral(7, "Stale");
        let watch = peripheral(8, "Watch");
        let scale = peripheral(9, "Scale");

        central.complete_connection(&stale);
        events.recv().await;
        events.recv().await;

        central.restore(
            vec![
                RestoredPeripheral {
                    peripheral: watch.clone(),
                    connected: true,
                },
                RestoredPeripheral {
                    peripheral: scale.clone(),
                    connected: false,
                },
            ],
            true,
        );
        assert_eq!(
            events.recv().await,
            Some(BluetoothEvent::PeripheralsChanged(vec![watch.clone()]))
        );
        assert!(manager.is_connected(&watch).await.unwrap());
        assert!(!manager.is_connected(&stale).await.unwrap());
        assert!(!manager.is_connected(&scale).await.unwrap());
        assert!(manager.is_scanning().await.unwrap());
        assert_eq!(manager.rssi(&scale).await.unwrap(), None);
    }
}
