use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::delegate::DelegateRegistry;
use crate::error::Result;
use crate::timer::{StationaryCountdown, Tick, TimerSlot};

use super::controller::{
    Command, SessionEvent, SessionManagerOptions, SessionState, StartOutcome, StopReason,
};
use super::feeds::{AccelerometerFeed, LocationFeed, MotionActivityFeed};
use super::samples::{
    CircularRegion, LocationMode, LocationSample, MonitoredRegion, MotionActivitySample,
    RegionEvent,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub(super) struct Streams {
    pub(super) commands: mpsc::UnboundedReceiver<Command>,
    pub(super) ticks: mpsc::UnboundedReceiver<Tick>,
    pub(super) locations: Option<mpsc::UnboundedReceiver<Vec<LocationSample>>>,
    pub(super) regions: Option<mpsc::UnboundedReceiver<RegionEvent>>,
    pub(super) activities: Option<mpsc::UnboundedReceiver<MotionActivitySample>>,
}

/// State owned by the session task. Everything here is touched from that
/// task only.
pub(super) struct SessionWorker {
    accelerometer: AccelerometerFeed,
    location: LocationFeed,
    motion: MotionActivityFeed,
    options: SessionManagerOptions,
    state: SessionState,
    last_outcome: Option<StartOutcome>,
    countdown: StationaryCountdown,
    stationary_timer: TimerSlot,
    ticks_tx: mpsc::UnboundedSender<Tick>,
    delegates: Arc<DelegateRegistry<SessionEvent>>,
}

async fn next<T>(receiver: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

pub(super) async fn session_loop(
    mut worker: SessionWorker,
    mut streams: Streams,
    cancel_token: CancellationToken,
) {
    log_info!("session loop started");
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("session loop shutting down");
                break;
            }
            command = streams.commands.recv() => match command {
                Some(command) => worker.handle_command(command),
                None => break,
            },
            Some(tick) = streams.ticks.recv() => worker.on_tick(tick),
            Some(batch) = next(&mut streams.locations) => worker.on_locations(batch),
            Some(sample) = next(&mut streams.activities) => worker.on_activity(sample),
            Some(event) = next(&mut streams.regions) => worker.on_region(event),
        }
    }
    // Feeds are stopped when the worker drops.
}

impl SessionWorker {
    pub(super) fn new(
        accelerometer: AccelerometerFeed,
        location: LocationFeed,
        motion: MotionActivityFeed,
        options: SessionManagerOptions,
        ticks_tx: mpsc::UnboundedSender<Tick>,
        delegates: Arc<DelegateRegistry<SessionEvent>>,
    ) -> Self {
        Self {
            accelerometer,
            location,
            motion,
            countdown: StationaryCountdown::new(options.stationary_timeout_ticks),
            stationary_timer: TimerSlot::new(options.stationary_tick),
            options,
            state: SessionState::Idle,
            last_outcome: None,
            ticks_tx,
            delegates,
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { mode, reply } => {
                let _ = reply.send(self.start(mode));
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop(StopReason::Requested));
            }
            Command::StartMonitoring { region, reply } => {
                let result = self
                    .location
                    .start_monitoring(region)
                    .map_err(Into::into);
                let _ = reply.send(result);
            }
            Command::StopMonitoring { identifier, reply } => {
                let _ = reply.send(self.location.stop_monitoring(&identifier));
            }
            Command::State { reply } => {
                let _ = reply.send(self.state);
            }
        }
    }

    fn notify(&self, event: SessionEvent) {
        if !self.delegates.notify(event) {
            log_debug!("no session delegate registered; event dropped");
        }
    }

    fn start(&mut self, mode: LocationMode) -> Result<StartOutcome> {
        if self.state == SessionState::Recording {
            self.location.start(mode)?;
            let outcome = match self.last_outcome.take() {
                Some(previous) => StartOutcome {
                    mode,
                    resumed: true,
                    ..previous
                },
                None => StartOutcome {
                    mode,
                    resumed: true,
                    motion: Ok(()),
                    accelerometer: Ok(()),
                },
            };
            self.last_outcome = Some(outcome.clone());
            log_info!("location mode switched to {:?}", mode);
            return Ok(outcome);
        }

        let motion = self.motion.start();
        if let Err(err) = &motion {
            log_warn!("recording without motion activity: {err}");
        }

        if let Err(err) = self.location.start(mode) {
            self.motion.stop();
            log_warn!("recording not started: {err}");
            return Err(err.into());
        }

        let accelerometer = self.accelerometer.start(self.options.accelerometer_interval());
        if let Err(err) = &accelerometer {
            log_warn!("recording without accelerometer: {err}");
        }

        self.state = SessionState::Recording;
        self.countdown.reset();
        let outcome = StartOutcome {
            mode,
            resumed: false,
            motion,
            accelerometer,
        };
        self.last_outcome = Some(outcome.clone());
        log_info!("recording started ({:?})", mode);
        Ok(outcome)
    }

    /// Recording -> Idle. No-op while idle.
    fn stop(&mut self, reason: StopReason) -> bool {
        if self.state == SessionState::Idle {
            return false;
        }
        self.halt();
        log_info!("recording stopped: {:?}", reason);
        self.notify(SessionEvent::RecordingStopped(reason));
        true
    }

    fn halt(&mut self) {
        self.accelerometer.stop();
        self.location.stop();
        self.motion.stop();
        self.stationary_timer.disarm();
        self.countdown.reset();
        self.state = SessionState::Idle;
        self.last_outcome = None;
    }

    fn on_locations(&mut self, batch: Vec<LocationSample>) {
        if self.state != SessionState::Recording {
            log_debug!("dropping {} location(s) received while idle", batch.len());
            return;
        }
        let Some(location) = batch.into_iter().next() else {
            return;
        };
        let accelerometer = self.accelerometer.latest();
        self.notify(SessionEvent::LocationUpdate {
            location,
            accelerometer,
        });
    }

    fn on_activity(&mut self, sample: MotionActivitySample) {
        if self.state != SessionState::Recording {
            log_debug!("dropping motion activity received while idle");
            return;
        }
        self.notify(SessionEvent::ActivityUpdate(sample));

        if !self.countdown.is_enabled() {
            return;
        }
        if sample.flags.is_moving() {
            if self.stationary_timer.is_armed() {
                log_debug!("moving again; stationary countdown cancelled");
            }
            self.stationary_timer.disarm();
            self.countdown.reset();
        } else if self.stationary_timer.arm(&self.ticks_tx) {
            log_debug!("stationary countdown armed");
        }
    }

    fn on_tick(&mut self, tick: Tick) {
        if !self.stationary_timer.accepts(tick) {
            return;
        }
        if self.countdown.tick() {
            log_info!(
                "stationary for {} ticks; stopping",
                self.countdown.threshold
            );
            self.stop(StopReason::StationaryTimeout);
        }
    }

    fn on_region(&mut self, event: RegionEvent) {
        let MonitoredRegion::Circular(reported) = event.region else {
            log_debug!("ignoring crossing of non-circular region");
            return;
        };
        // Prefer what we asked to monitor; the OS copy may be stale.
        let region: CircularRegion = self
            .location
            .monitored_region(&reported.identifier)
            .cloned()
            .unwrap_or(reported);
        if !region.notifies(event.crossing) {
            return;
        }
        log_info!("region {} {:?}", region.identifier, event.crossing);
        self.notify(SessionEvent::RegionCrossing {
            region,
            crossing: event.crossing,
        });
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        self.halt();
    }
}
