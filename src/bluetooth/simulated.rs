//! In-process central for hosts without a Bluetooth radio and for tests.

use std::sync::{Mutex, MutexGuard};

use crate::sensing::SamplePublisher;

use super::central::{
    CentralBackend, CentralEvent, CentralState, ConnectOptions, Peripheral, RestoredPeripheral,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
struct CentralSimState {
    publisher: Option<SamplePublisher<CentralEvent>>,
    restore_identifier: Option<String>,
    connected: Vec<Peripheral>,
    connect_requests: Vec<(Peripheral, ConnectOptions)>,
    scan_count: usize,
    stop_scan_count: usize,
}

#[derive(Default)]
pub struct SimulatedCentral {
    state: Mutex<CentralSimState>,
}

impl SimulatedCentral {
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(&self, event: CentralEvent) -> bool {
        lock(&self.state)
            .publisher
            .as_ref()
            .is_some_and(|publisher| publisher.publish(event))
    }

    pub fn set_state(&self, state: CentralState) -> bool {
        self.publish(CentralEvent::StateChanged(state))
    }

    pub fn discover(&self, peripheral: &Peripheral, rssi: Option<i16>) -> bool {
        self.publish(CentralEvent::Discovered {
            peripheral: peripheral.clone(),
            rssi,
        })
    }

    pub fn complete_connection(&self, peripheral: &Peripheral) -> bool {
        {
            let mut state = lock(&self.state);
            if !state.connected.contains(peripheral) {
                state.connected.push(peripheral.clone());
            }
        }
        self.publish(CentralEvent::Connected(peripheral.clone()))
    }

    pub fn fail_connection(&self, peripheral: &Peripheral, reason: &str) -> bool {
        self.publish(CentralEvent::FailedToConnect {
            peripheral: peripheral.clone(),
            reason: reason.to_string(),
        })
    }

    pub fn disconnect(&self, peripheral: &Peripheral, reason: Option<&str>) -> bool {
        lock(&self.state)
            .connected
            .retain(|existing| existing != peripheral);
        self.publish(CentralEvent::Disconnected {
            peripheral: peripheral.clone(),
            reason: reason.map(str::to_string),
        })
    }

    /// Replays a state restoration the OS performs on relaunch.
    pub fn restore(&self, peripherals: Vec<RestoredPeripheral>, scanning: bool) -> bool {
        lock(&self.state).connected = peripherals
            .iter()
            .filter(|restored| restored.connected)
            .map(|restored| restored.peripheral.clone())
            .collect();
        self.publish(CentralEvent::WillRestoreState {
            peripherals,
            scanning,
        })
    }

    /// What `retrieve_connected_peripherals` reports from now on.
    pub fn set_connected(&self, peripherals: Vec<Peripheral>) {
        lock(&self.state).connected = peripherals;
    }

    pub fn restore_identifier(&self) -> Option<String> {
        lock(&self.state).restore_identifier.clone()
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.state).publisher.is_some()
    }

    pub fn connect_requests(&self) -> Vec<(Peripheral, ConnectOptions)> {
        lock(&self.state).connect_requests.clone()
    }

    pub fn scan_count(&self) -> usize {
        lock(&self.state).scan_count
    }

    pub fn stop_scan_count(&self) -> usize {
        lock(&self.state).stop_scan_count
    }
}

impl CentralBackend for SimulatedCentral {
    fn attach(&self, restore_identifier: Option<&str>, publisher: SamplePublisher<CentralEvent>) {
        let mut state = lock(&self.state);
        state.restore_identifier = restore_identifier.map(str::to_string);
        state.publisher = Some(publisher);
    }

    fn scan_for_peripherals(&self) {
        lock(&self.state).scan_count += 1;
    }

    fn stop_scan(&self) {
        lock(&self.state).stop_scan_count += 1;
    }

    fn connect(&self, peripheral: &Peripheral, options: ConnectOptions) {
        lock(&self.state)
            .connect_requests
            .push((peripheral.clone(), options));
    }

    fn cancel_connection(&self, peripheral: &Peripheral) {
        self.disconnect(peripheral, None);
    }

    fn retrieve_connected_peripherals(&self) -> Vec<Peripheral> {
        lock(&self.state).connected.clone()
    }
}
