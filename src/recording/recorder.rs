//! Turns session manager events into stored entries.
//!
//! The recorder task owns the current session. Every event becomes entries
//! on that session and is saved right away; entries from a failed save stay
//! pending, up to [`MAX_PENDING`], and go out with the next one.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};

use crate::db::{Entry, Session, SessionOrigin};
use crate::error::{HermesError, Result};
use crate::sensing::{SessionControl, SessionEvent, StopReason};
use crate::store::EntryStore;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Entries kept while the store refuses writes; older ones are dropped first.
pub(crate) const MAX_PENDING: usize = 512;

pub(crate) enum RecorderCommand {
    /// Makes `session` current, flushing whatever the previous one left.
    Begin {
        session: Session,
        reply: oneshot::Sender<()>,
    },
    /// Flushes and clears the current session, returning it.
    End {
        reply: oneshot::Sender<Option<Session>>,
    },
    /// Retries pending entries; replies with how many are still pending.
    Flush { reply: oneshot::Sender<usize> },
}

/// Cloneable sender side of the recorder task.
#[derive(Clone)]
pub(crate) struct RecorderHandle {
    commands: mpsc::UnboundedSender<RecorderCommand>,
}

fn stopped() -> HermesError {
    HermesError::Internal("session recorder is no longer running".into())
}

impl RecorderHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RecorderCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands.send(build(reply_tx)).map_err(|_| stopped())?;
        reply_rx.await.map_err(|_| stopped())
    }

    pub(crate) async fn begin(&self, session: Session) -> Result<()> {
        self.request(|reply| RecorderCommand::Begin { session, reply })
            .await
    }

    pub(crate) async fn end(&self) -> Result<Option<Session>> {
        self.request(|reply| RecorderCommand::End { reply }).await
    }

    pub(crate) async fn flush(&self) -> Result<usize> {
        self.request(|reply| RecorderCommand::Flush { reply }).await
    }
}

pub(crate) struct SessionRecorder<S: EntryStore> {
    store: S,
    control: SessionControl,
    current: Option<Session>,
    pending: Vec<Entry>,
    /// Set from the first failed save until the next successful one.
    failing: bool,
    overflowed: bool,
    current_tx: watch::Sender<Option<Session>>,
    failures: mpsc::UnboundedSender<HermesError>,
}

/// Receivers the context keeps for the recorder it spawned.
pub(crate) struct RecorderChannels {
    pub(crate) handle: RecorderHandle,
    pub(crate) current: watch::Receiver<Option<Session>>,
    pub(crate) failures: mpsc::UnboundedReceiver<HermesError>,
}

impl<S: EntryStore> SessionRecorder<S> {
    /// Spawns the recorder task consuming `events`. The task ends when both
    /// the event stream and every [`RecorderHandle`] are gone.
    pub(crate) fn spawn(
        store: S,
        control: SessionControl,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> RecorderChannels {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (current_tx, current_rx) = watch::channel(None);
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        let recorder = SessionRecorder {
            store,
            control,
            current: None,
            pending: Vec::new(),
            failing: false,
            overflowed: false,
            current_tx,
            failures: failures_tx,
        };
        tokio::spawn(recorder.run(events, commands_rx));

        RecorderChannels {
            handle: RecorderHandle {
                commands: commands_tx,
            },
            current: current_rx,
            failures: failures_rx,
        }
    }

    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut commands: mpsc::UnboundedReceiver<RecorderCommand>,
    ) {
        let mut events_open = true;
        let mut commands_open = true;
        while events_open || commands_open {
            tokio::select! {
                // Events first: a command sent after a stop must see every
                // entry recorded before it.
                biased;
                event = events.recv(), if events_open => match event {
                    Some(event) => self.on_event(event).await,
                    None => events_open = false,
                },
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.on_command(command).await,
                    None => commands_open = false,
                },
            }
        }
        if !self.pending.is_empty() {
            self.save().await;
        }
        log_info!("session recorder stopped");
    }

    async fn on_command(&mut self, command: RecorderCommand) {
        match command {
            RecorderCommand::Begin { session, reply } => {
                self.switch_to(Some(session)).await;
                let _ = reply.send(());
            }
            RecorderCommand::End { reply } => {
                let ended = self.switch_to(None).await;
                let _ = reply.send(ended);
            }
            RecorderCommand::Flush { reply } => {
                if !self.pending.is_empty() {
                    self.save().await;
                }
                let _ = reply.send(self.pending.len());
            }
        }
    }

    async fn on_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::LocationUpdate {
                location,
                accelerometer,
            } => {
                self.record(Entry::Location(location.into_entry(accelerometer)))
                    .await;
            }
            SessionEvent::ActivityUpdate(sample) => {
                self.record(Entry::MotionActivity(sample.into_entry(Utc::now())))
                    .await;
            }
            SessionEvent::RegionCrossing { region, crossing } => {
                log_info!("geofence {} {:?}; starting a new session", region.identifier, crossing);
                self.start_generated(SessionOrigin::Geofence, Utc::now())
                    .await;
            }
            SessionEvent::RecordingStopped(StopReason::StationaryTimeout) => {
                if let Some(session) = self.switch_to(None).await {
                    log_info!("session {:?} ended after stationary timeout", session.name);
                }
            }
            SessionEvent::RecordingStopped(StopReason::Requested) => {
                if !self.pending.is_empty() {
                    self.save().await;
                }
            }
        }
    }

    async fn start_generated(&mut self, origin: SessionOrigin, at: DateTime<Utc>) {
        match self.store.create_generated_session(origin, at).await {
            Ok(session) => {
                self.switch_to(Some(session)).await;
            }
            Err(err) => {
                self.fail(err);
                return;
            }
        }
        if let Err(err) = self.control.start_updating_location().await {
            log_warn!("could not start recording for {:?} session: {err}", origin.suffix());
            self.fail(err);
        }
    }

    /// Replaces the current session and returns the previous one.
    async fn switch_to(&mut self, next: Option<Session>) -> Option<Session> {
        if !self.pending.is_empty() {
            self.save().await;
        }
        if !self.pending.is_empty() {
            log_error!(
                "discarding {} unsaved entries of {:?}",
                self.pending.len(),
                self.current.as_ref().map(|session| session.name.as_str())
            );
            self.pending.clear();
        }
        let previous = std::mem::replace(&mut self.current, next);
        self.current_tx.send_replace(self.current.clone());
        previous
    }

    async fn record(&mut self, entry: Entry) {
        if self.current.is_none() {
            log_debug!("no current session; {:?} entry dropped", entry.kind());
            return;
        }
        self.pending.push(entry);
        if self.pending.len() > MAX_PENDING {
            let overflow = self.pending.len() - MAX_PENDING;
            self.pending.drain(..overflow);
            if !self.overflowed {
                self.overflowed = true;
                log_error!("store is not accepting entries; dropping the oldest beyond {MAX_PENDING}");
                self.fail(HermesError::StoreWriteFailed(format!(
                    "more than {MAX_PENDING} entries pending; oldest dropped"
                )));
            }
        }
        self.save().await;
    }

    async fn save(&mut self) {
        let Some(session) = self.current.clone() else {
            self.pending.clear();
            return;
        };
        let batch = self.pending.clone();
        let count = batch.len();
        match self.store.append_entries(&session, batch).await {
            Ok(()) => {
                self.pending.drain(..count);
                self.failing = false;
                self.overflowed = false;
            }
            Err(err) => {
                if !self.session_exists(&session).await {
                    log_error!(
                        "session {:?} no longer exists; dropping {count} entries and ending it",
                        session.name
                    );
                    self.pending.clear();
                    self.failing = false;
                    self.overflowed = false;
                    self.current = None;
                    self.current_tx.send_replace(None);
                    self.fail(HermesError::SessionNotFound(session.name));
                    return;
                }
                if !self.failing {
                    self.failing = true;
                    log_warn!(
                        "saving {count} entries to {:?} failed; keeping them: {err}",
                        session.name
                    );
                    self.fail(err);
                }
            }
        }
    }

    /// False only when the store positively reports the session gone.
    async fn session_exists(&self, session: &Session) -> bool {
        match self.store.find_session(&session.name).await {
            Ok(found) => found.is_some_and(|found| found.id == session.id),
            Err(_) => true,
        }
    }

    fn fail(&self, err: HermesError) {
        if err.is_fatal() {
            log_error!("fatal store error: {err}");
        }
        let _ = self.failures.send(err);
    }
}
