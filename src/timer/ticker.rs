//! Owned repeating timers.
//!
//! A [`RepeatingTimer`] runs as a small task that sends [`Tick`]s into the
//! owner's channel. The owner keeps the handle; cancelling (explicitly or by
//! dropping it) stops the task. Ticks carry the timer's generation so a tick
//! that was already queued when the timer was cancelled can be recognized
//! and ignored.

use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub generation: u64,
}

pub struct RepeatingTimer {
    generation: u64,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTimer {
    /// Starts ticking every `period`, first tick one period from now.
    pub fn spawn(period: Duration, generation: u64, sink: mpsc::UnboundedSender<Tick>) -> Self {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if sink.send(Tick { generation }).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            generation,
            cancel_token,
            handle: Some(handle),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Stops the timer. Safe to call any number of times.
    pub fn cancel(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// At most one armed timer plus the generation counter that tells its ticks
/// apart from those of earlier timers.
pub struct TimerSlot {
    period: Duration,
    next_generation: u64,
    timer: Option<RepeatingTimer>,
}

impl TimerSlot {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_generation: 1,
            timer: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_cancelled())
    }

    /// Arms the slot unless already armed. Returns true if a new timer started.
    pub fn arm(&mut self, sink: &mpsc::UnboundedSender<Tick>) -> bool {
        if self.is_armed() {
            return false;
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.timer = Some(RepeatingTimer::spawn(self.period, generation, sink.clone()));
        true
    }

    pub fn disarm(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }
    }

    /// Whether `tick` came from the currently armed timer.
    pub fn accepts(&self, tick: Tick) -> bool {
        self.timer
            .as_ref()
            .is_some_and(|timer| !timer.is_cancelled() && timer.generation() == tick.generation)
    }
}
