//! The Bluetooth central as the core sees it.

use serde::Serialize;
use uuid::Uuid;

use crate::sensing::SamplePublisher;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Peripheral {
    pub identifier: Uuid,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CentralState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Ask the OS to alert the user when the peripheral connects while
    /// the app is suspended.
    pub notify_on_connection: bool,
    pub notify_on_disconnection: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredPeripheral {
    pub peripheral: Peripheral,
    pub connected: bool,
}

/// Callbacks from the native central.
#[derive(Debug, Clone, PartialEq)]
pub enum CentralEvent {
    StateChanged(CentralState),
    /// An advertisement was seen. `rssi` is absent when the OS could not
    /// measure it.
    Discovered {
        peripheral: Peripheral,
        rssi: Option<i16>,
    },
    Connected(Peripheral),
    FailedToConnect {
        peripheral: Peripheral,
        reason: String,
    },
    Disconnected {
        peripheral: Peripheral,
        reason: Option<String>,
    },
    /// The OS relaunched the app and hands back the central's previous state.
    WillRestoreState {
        peripherals: Vec<RestoredPeripheral>,
        scanning: bool,
    },
}

pub trait CentralBackend: Send + Sync + 'static {
    /// Called once when the manager is created. A restore identifier opts
    /// into state restoration.
    fn attach(&self, restore_identifier: Option<&str>, publisher: SamplePublisher<CentralEvent>);
    fn scan_for_peripherals(&self);
    fn stop_scan(&self);
    fn connect(&self, peripheral: &Peripheral, options: ConnectOptions);
    fn cancel_connection(&self, peripheral: &Peripheral);
    fn retrieve_connected_peripherals(&self) -> Vec<Peripheral>;
}
