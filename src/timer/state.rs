use serde::Serialize;

/// Counts consecutive stationary ticks toward an automatic stop.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StationaryCountdown {
    /// Ticks needed to fire; zero disables the countdown.
    pub threshold: u32,
    pub ticks: u32,
}

impl StationaryCountdown {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            ticks: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.threshold > 0
    }

    /// Records one tick. Returns true exactly when the threshold is reached,
    /// after which the counter starts over.
    pub fn tick(&mut self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.ticks = self.ticks.saturating_add(1);
        if self.ticks >= self.threshold {
            self.ticks = 0;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.ticks = 0;
    }
}
