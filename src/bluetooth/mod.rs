pub mod central;
pub mod manager;
pub mod ranking;
pub mod simulated;

pub use central::{
    CentralBackend, CentralEvent, CentralState, ConnectOptions, Peripheral, RestoredPeripheral,
};
pub use manager::{BluetoothEvent, BluetoothManager};
pub use ranking::{rank_peripherals, RankedPeripheral};
pub use simulated::SimulatedCentral;
