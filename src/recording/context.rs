//! The object a host app keeps for the lifetime of the process.

use std::{path::Path, sync::Arc};

use chrono::Utc;
use tokio::sync::{mpsc, watch};

use crate::bluetooth::{BluetoothManager, CentralBackend};
use crate::config::HermesConfig;
use crate::db::{EntryFilter, EntryKind, Geofence, Session, SessionOrigin, StoredEntry};
use crate::error::{HermesError, Result};
use crate::export::{export_session, ExportReport};
use crate::sensing::{
    CircularRegion, SensorBackends, SessionControl, SessionManager, SessionManagerOptions,
    StartOutcome,
};
use crate::settings::SettingsStore;
use crate::store::{EntryStore, SqliteStore};

use super::recorder::{RecorderHandle, SessionRecorder};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Why the OS launched the process.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Relaunched to deliver a location event.
    pub location_relaunch: bool,
    /// Restore identifiers of Bluetooth centrals the OS relaunched us for.
    pub bluetooth_centrals: Vec<String>,
}

#[derive(Debug)]
pub struct LaunchReport {
    /// Session opened because of how the process was launched.
    pub session: Option<Session>,
    /// Significant-change monitoring, started on every launch.
    pub location: Result<StartOutcome>,
    pub geofences_armed: usize,
    pub bluetooth_restored: bool,
}

pub struct RecordingContext {
    config: HermesConfig,
    store: SqliteStore,
    settings: Arc<SettingsStore>,
    sessions: SessionManager,
    control: SessionControl,
    recorder: RecorderHandle,
    current: watch::Receiver<Option<Session>>,
    failures: Option<mpsc::UnboundedReceiver<HermesError>>,
    central: Option<Arc<dyn CentralBackend>>,
    bluetooth: Option<BluetoothManager>,
    launched: bool,
}

impl RecordingContext {
    /// Opens the store and settings under `config.data_dir` and wires the
    /// session manager to a recorder. Must be called inside a tokio runtime.
    pub fn open(
        config: HermesConfig,
        backends: SensorBackends,
        central: Option<Arc<dyn CentralBackend>>,
    ) -> Result<Self> {
        let store = SqliteStore::open(config.database_path())?;
        let settings = Arc::new(SettingsStore::new(config.settings_path())?);
        Ok(Self::assemble(config, store, settings, backends, central))
    }

    /// Like [`Self::open`] with a store that lives only in memory.
    pub fn in_memory(
        config: HermesConfig,
        backends: SensorBackends,
        central: Option<Arc<dyn CentralBackend>>,
    ) -> Result<Self> {
        let store = SqliteStore::in_memory()?;
        let settings = Arc::new(SettingsStore::new(config.settings_path())?);
        Ok(Self::assemble(config, store, settings, backends, central))
    }

    fn assemble(
        config: HermesConfig,
        store: SqliteStore,
        settings: Arc<SettingsStore>,
        backends: SensorBackends,
        central: Option<Arc<dyn CentralBackend>>,
    ) -> Self {
        let options = SessionManagerOptions::from_config(&config, Some(Arc::clone(&settings)));
        let sessions = SessionManager::new(backends, options);
        let control = sessions.control();
        let (_, events) = sessions.register_delegate();
        let channels = SessionRecorder::spawn(store.clone(), control.clone(), events);

        Self {
            config,
            store,
            settings,
            sessions,
            control,
            recorder: channels.handle,
            current: channels.current,
            failures: Some(channels.failures),
            central,
            bluetooth: None,
            launched: false,
        }
    }

    /// Runs the launch sequence once: significant-change monitoring, a
    /// generated session when the OS relaunched us, Bluetooth restoration,
    /// and re-arming stored geofences.
    pub async fn launch(&mut self, options: LaunchOptions) -> Result<LaunchReport> {
        if self.launched {
            return Err(HermesError::Internal("recording context already launched".into()));
        }
        self.launched = true;

        let mut session = None;
        if options.location_relaunch {
            session = Some(self.begin_generated(SessionOrigin::BackgroundLaunch).await?);
        }

        let location = self
            .control
            .start_monitoring_significant_location_changes()
            .await;
        if let Err(err) = &location {
            log_warn!("significant-change monitoring not started: {err}");
        }

        let restore_identifier = self.config.bluetooth_restore_identifier.clone();
        let bluetooth_restored = options.bluetooth_centrals.first() == Some(&restore_identifier)
            && self.central.is_some();
        if bluetooth_restored {
            session = Some(
                self.begin_generated(SessionOrigin::BluetoothRestoration)
                    .await?,
            );
            self.enable_bluetooth();
        }

        let geofences_armed = self.arm_geofences().await?;

        log_info!(
            "launched (session: {:?}, geofences: {geofences_armed}, bluetooth restored: {bluetooth_restored})",
            session.as_ref().map(|s| s.name.as_str())
        );
        Ok(LaunchReport {
            session,
            location,
            geofences_armed,
            bluetooth_restored,
        })
    }

    async fn begin_generated(&self, origin: SessionOrigin) -> Result<Session> {
        let session = self
            .store
            .create_generated_session(origin, Utc::now())
            .await?;
        self.recorder.begin(session.clone()).await?;
        Ok(session)
    }

    async fn arm_geofences(&self) -> Result<usize> {
        let mut armed = 0;
        for geofence in self.store.geofences().await? {
            match self
                .control
                .start_monitoring(CircularRegion::from(&geofence))
                .await
            {
                Ok(()) => armed += 1,
                Err(err) => log_warn!("geofence {} not armed: {err}", geofence.identifier),
            }
        }
        Ok(armed)
    }

    /// Creates the named session, makes it current and starts continuous
    /// recording. If recording cannot start the session is removed again.
    pub async fn start_session(&self, name: &str) -> Result<Session> {
        let session = self.store.create_session(name, Utc::now()).await?;
        self.recorder.begin(session.clone()).await?;

        if let Err(err) = self.control.start_updating_location().await {
            self.recorder.end().await?;
            if let Err(cleanup) = self.store.delete_session(&session.name).await {
                log_warn!("could not remove unstarted session {:?}: {cleanup}", session.name);
            }
            return Err(err);
        }
        log_info!("session {:?} started", session.name);
        Ok(session)
    }

    /// Stops recording and ends the current session, returning it.
    pub async fn stop_session(&self) -> Result<Option<Session>> {
        self.control.stop_updates().await?;
        let ended = self.recorder.end().await?;
        if let Some(session) = &ended {
            log_info!("session {:?} stopped", session.name);
        }
        Ok(ended)
    }

    pub fn current_session(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    /// Follows the current session as it changes.
    pub fn watch_current_session(&self) -> watch::Receiver<Option<Session>> {
        self.current.clone()
    }

    /// Store and recording failures from the recorder task. Can be taken once.
    pub fn failures(&mut self) -> Option<mpsc::UnboundedReceiver<HermesError>> {
        self.failures.take()
    }

    pub async fn sessions(&self) -> Result<Vec<Session>> {
        self.store.list_sessions().await
    }

    pub async fn entries(&self, session_name: &str, kind: Option<EntryKind>) -> Result<Vec<StoredEntry>> {
        self.store.entries(session_name, kind).await
    }

    pub async fn delete_entries(&self, filter: EntryFilter) -> Result<usize> {
        self.store.delete_entries(filter).await
    }

    /// Deletes a session and its entries, stopping it first if it is the
    /// current one.
    pub async fn delete_session(&self, name: &str) -> Result<()> {
        let is_current = self
            .current
            .borrow()
            .as_ref()
            .is_some_and(|session| session.name == name);
        if is_current {
            self.stop_session().await?;
        }
        self.store.delete_session(name).await
    }

    /// Writes the session's tables into `directory` using a separate
    /// read-only connection.
    pub async fn export(&self, session_name: &str, directory: &Path) -> Result<ExportReport> {
        if self.store.find_session(session_name).await?.is_none() {
            return Err(HermesError::SessionNotFound(session_name.to_string()));
        }
        let reader = Arc::new(self.store.reader()?);
        Ok(export_session(reader, session_name, directory).await)
    }

    /// Persists the geofence and starts monitoring it.
    pub async fn add_geofence(&self, geofence: Geofence) -> Result<()> {
        if !(geofence.radius.is_finite() && geofence.radius > 0.0) {
            return Err(HermesError::InvalidSetting(format!(
                "geofence radius must be positive, got {}",
                geofence.radius
            )));
        }
        self.store.save_geofence(&geofence).await?;
        self.control
            .start_monitoring(CircularRegion::from(&geofence))
            .await
    }

    pub async fn remove_geofence(&self, identifier: &str) -> Result<bool> {
        self.control.stop_monitoring(identifier).await?;
        self.store.delete_geofence(identifier).await
    }

    pub async fn geofences(&self) -> Result<Vec<Geofence>> {
        self.store.geofences().await
    }

    /// Stores the accelerometer interval in seconds. Takes effect the next
    /// time recording starts.
    pub fn set_update_interval(&self, seconds: f64) -> Result<()> {
        self.settings.set_update_interval(seconds)
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Drives the session manager directly. The manager's delegate slot
    /// belongs to the recorder and is not reachable from here.
    pub fn session_control(&self) -> SessionControl {
        self.sessions.control()
    }

    pub fn bluetooth(&self) -> Option<&BluetoothManager> {
        self.bluetooth.as_ref()
    }

    /// Creates the Bluetooth manager if a central backend was supplied.
    pub fn enable_bluetooth(&mut self) -> Option<&BluetoothManager> {
        if self.bluetooth.is_none() {
            let central = self.central.as_ref()?;
            self.bluetooth = Some(BluetoothManager::new(
                Arc::clone(central),
                Some(self.config.bluetooth_restore_identifier.clone()),
                self.config.ranking_interval,
            ));
        }
        self.bluetooth.as_ref()
    }

    /// Stops recording, saves what is pending and tears the managers down.
    /// Returns the number of entries that could not be saved.
    pub async fn shutdown(self) -> Result<usize> {
        self.control.stop_updates().await?;
        let unsaved = self.recorder.flush().await?;
        if unsaved > 0 {
            log_warn!("shutting down with {unsaved} unsaved entries");
        }
        log_info!("recording context shut down");
        Ok(unsaved)
    }
}
