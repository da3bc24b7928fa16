pub mod state;
pub mod ticker;

pub use state::StationaryCountdown;
pub use ticker::{RepeatingTimer, Tick, TimerSlot};
