use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::HermesConfig;
use crate::delegate::{DelegateId, DelegateRegistry};
use crate::error::{FeedError, HermesError, Result};
use crate::settings::SettingsStore;

use super::feeds::{
    AccelerometerBackend, AccelerometerFeed, LocationBackend, LocationFeed,
    MotionActivityBackend, MotionActivityFeed,
};
use super::loop_worker::{session_loop, SessionWorker, Streams};
use super::samples::{
    AccelerometerSample, CircularRegion, Crossing, LocationMode, LocationSample,
    MotionActivitySample,
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Recording,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// `stop_updates` was called.
    Requested,
    /// The device sat still for the whole stationary timeout.
    StationaryTimeout,
}

/// What the session manager tells its delegate.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ActivityUpdate(MotionActivitySample),
    /// The first location of a batch, paired with the accelerometer sample
    /// that was current when it arrived.
    LocationUpdate {
        location: LocationSample,
        accelerometer: Option<AccelerometerSample>,
    },
    RegionCrossing {
        region: CircularRegion,
        crossing: Crossing,
    },
    RecordingStopped(StopReason),
}

/// Result of a start call. Location must start; the other feeds are
/// reported rather than failing the start.
#[derive(Debug, Clone, PartialEq)]
pub struct StartOutcome {
    pub mode: LocationMode,
    /// Recording was already active and only the location mode changed.
    pub resumed: bool,
    pub motion: std::result::Result<(), FeedError>,
    pub accelerometer: std::result::Result<(), FeedError>,
}

pub struct SensorBackends {
    pub accelerometer: Arc<dyn AccelerometerBackend>,
    pub location: Arc<dyn LocationBackend>,
    pub motion: Arc<dyn MotionActivityBackend>,
}

#[derive(Clone)]
pub struct SessionManagerOptions {
    /// Stationary ticks before recording stops on its own; zero disables it.
    pub stationary_timeout_ticks: u32,
    pub stationary_tick: Duration,
    pub accelerometer_interval: Duration,
    /// When set, its `update_interval` wins over `accelerometer_interval`.
    pub settings: Option<Arc<SettingsStore>>,
}

impl Default for SessionManagerOptions {
    fn default() -> Self {
        Self::from_config(&HermesConfig::default(), None)
    }
}

impl SessionManagerOptions {
    pub fn from_config(config: &HermesConfig, settings: Option<Arc<SettingsStore>>) -> Self {
        Self {
            stationary_timeout_ticks: config.stationary_timeout_ticks,
            stationary_tick: config.stationary_tick,
            accelerometer_interval: config.default_accelerometer_interval,
            settings,
        }
    }

    pub(super) fn accelerometer_interval(&self) -> Duration {
        match &self.settings {
            Some(settings) => settings.update_interval_or(self.accelerometer_interval),
            None => self.accelerometer_interval,
        }
    }
}

pub(super) enum Command {
    Start {
        mode: LocationMode,
        reply: oneshot::Sender<Result<StartOutcome>>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
    StartMonitoring {
        region: CircularRegion,
        reply: oneshot::Sender<Result<()>>,
    },
    StopMonitoring {
        identifier: String,
        reply: oneshot::Sender<bool>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
}

/// Cloneable handle for driving a [`SessionManager`] without keeping it
/// alive.
#[derive(Clone)]
pub struct SessionControl {
    commands: mpsc::UnboundedSender<Command>,
}

fn stopped() -> HermesError {
    HermesError::Internal("session manager is no longer running".into())
}

impl SessionControl {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands.send(build(reply_tx)).map_err(|_| stopped())?;
        reply_rx.await.map_err(|_| stopped())
    }

    /// Idle -> Recording with continuous location updates, or switches the
    /// location mode if already recording.
    pub async fn start_updating_location(&self) -> Result<StartOutcome> {
        self.request(|reply| Command::Start {
            mode: LocationMode::Continuous,
            reply,
        })
        .await?
    }

    /// Like [`Self::start_updating_location`] with coarse updates that also
    /// work in the background.
    pub async fn start_monitoring_significant_location_changes(&self) -> Result<StartOutcome> {
        self.request(|reply| Command::Start {
            mode: LocationMode::SignificantChanges,
            reply,
        })
        .await?
    }

    /// Recording -> Idle. Returns false (and does nothing) when already idle.
    pub async fn stop_updates(&self) -> Result<bool> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn start_monitoring(&self, region: CircularRegion) -> Result<()> {
        self.request(|reply| Command::StartMonitoring { region, reply })
            .await?
    }

    pub async fn stop_monitoring(&self, identifier: &str) -> Result<bool> {
        let identifier = identifier.to_string();
        self.request(|reply| Command::StopMonitoring { identifier, reply })
            .await
    }

    pub async fn state(&self) -> Result<SessionState> {
        self.request(|reply| Command::State { reply }).await
    }
}

/// Owns the sensor feeds and the task that consumes them.
///
/// Must be created inside a tokio runtime. Dropping the manager stops the
/// task, which stops every feed.
pub struct SessionManager {
    control: SessionControl,
    delegates: Arc<DelegateRegistry<SessionEvent>>,
    _worker_guard: DropGuard,
}

impl SessionManager {
    pub fn new(backends: SensorBackends, options: SessionManagerOptions) -> Self {
        let accelerometer = AccelerometerFeed::new(backends.accelerometer);
        let mut location = LocationFeed::new(backends.location);
        let mut motion = MotionActivityFeed::new(backends.motion);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let delegates = Arc::new(DelegateRegistry::new());

        let streams = Streams {
            commands: commands_rx,
            ticks: ticks_rx,
            locations: location.subscribe(),
            regions: location.subscribe_regions(),
            activities: motion.subscribe(),
        };

        let worker = SessionWorker::new(
            accelerometer,
            location,
            motion,
            options,
            ticks_tx,
            Arc::clone(&delegates),
        );

        let cancel_token = CancellationToken::new();
        tokio::spawn(session_loop(worker, streams, cancel_token.clone()));

        Self {
            control: SessionControl {
                commands: commands_tx,
            },
            delegates,
            _worker_guard: cancel_token.drop_guard(),
        }
    }

    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Registers the delegate, replacing the previous one.
    pub fn register_delegate(&self) -> (DelegateId, mpsc::UnboundedReceiver<SessionEvent>) {
        self.delegates.register()
    }

    pub fn unregister_delegate(&self, id: DelegateId) -> bool {
        self.delegates.unregister(id)
    }

    pub async fn start_updating_location(&self) -> Result<StartOutcome> {
        self.control.start_updating_location().await
    }

    pub async fn start_monitoring_significant_location_changes(&self) -> Result<StartOutcome> {
        self.control
            .start_monitoring_significant_location_changes()
            .await
    }

    pub async fn stop_updates(&self) -> Result<bool> {
        self.control.stop_updates().await
    }

    pub async fn start_monitoring(&self, region: CircularRegion) -> Result<()> {
        self.control.start_monitoring(region).await
    }

    pub async fn stop_monitoring(&self, identifier: &str) -> Result<bool> {
        self.control.stop_monitoring(identifier).await
    }

    pub async fn state(&self) -> Result<SessionState> {
        self.control.state().await
    }
}
