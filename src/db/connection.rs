use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::{Connection, OpenFlags};
use tokio::sync::oneshot;

use crate::error::HermesError;

use super::migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        else {
            return;
        };
        // A send error means the thread already exited; join still reaps it.
        if self.sender.send(DbCommand::Shutdown).is_err() {
            warn!("database worker gone before shutdown");
        }
        if let Err(panic) = worker.join() {
            error!("database worker panicked: {panic:?}");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(PathBuf),
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    ReadWrite,
    ReadOnly,
}

/// Handle to a SQLite connection owned by a dedicated worker thread.
///
/// Every statement runs on that thread, so callers on the async side never
/// block on disk I/O. Clones share the same worker.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    location: Arc<Location>,
}

/// Why opening failed; corruption is reported separately because it is fatal.
enum OpenError {
    Corrupted(String),
    Other(anyhow::Error),
}

impl Database {
    /// Opens (creating if needed) the store at `db_path` and migrates it.
    pub fn new(db_path: PathBuf) -> crate::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })
                .map_err(HermesError::write)?;
        }

        Self::spawn(Location::File(db_path), Access::ReadWrite)
    }

    /// A private in-memory store; used by tests and hosts that never persist.
    pub fn in_memory() -> crate::Result<Self> {
        Self::spawn(Location::Memory, Access::ReadWrite)
    }

    /// A read-only handle on its own connection, for long scans such as
    /// exports. In-memory stores cannot be reopened, so they share the writer.
    pub fn reader(&self) -> crate::Result<Self> {
        match self.location.as_ref() {
            Location::File(path) => Self::spawn(Location::File(path.clone()), Access::ReadOnly),
            Location::Memory => Ok(self.clone()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self.location.as_ref() {
            Location::File(path) => Some(path.as_path()),
            Location::Memory => None,
        }
    }

    fn spawn(location: Location, access: Access) -> crate::Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), OpenError>>();
        let location_for_thread = location.clone();

        let worker = thread::Builder::new()
            .name(match access {
                Access::ReadWrite => "hermes-db".into(),
                Access::ReadOnly => "hermes-db-reader".into(),
            })
            .spawn(move || {
                let mut conn = match open_connection(&location_for_thread, access) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                if ready_tx.send(Ok(())).is_err() {
                    error!("database opener gone before the ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("database worker shutting down");
            })
            .context("failed to spawn database worker thread")
            .map_err(|err| HermesError::Internal(format!("{err:#}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(OpenError::Corrupted(detail))) => {
                return Err(HermesError::StoreCorrupted(detail));
            }
            Ok(Err(OpenError::Other(err))) => return Err(HermesError::write(err)),
            Err(_) => {
                return Err(HermesError::Internal(
                    "database worker exited before signaling readiness".into(),
                ))
            }
        }

        match &location {
            Location::File(path) => info!(
                "database {} at {}",
                if access == Access::ReadOnly { "reader opened" } else { "initialized" },
                path.display()
            ),
            Location::Memory => info!("in-memory database ready"),
        }

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            location: Arc::new(location),
        })
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("database caller gone before the result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }
}

fn open_connection(location: &Location, access: Access) -> std::result::Result<Connection, OpenError> {
    let conn = match (location, access) {
        (Location::Memory, _) => Connection::open_in_memory(),
        (Location::File(path), Access::ReadWrite) => Connection::open(path),
        (Location::File(path), Access::ReadOnly) => Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        ),
    };
    let mut conn = conn
        .context("failed to open SQLite database")
        .map_err(OpenError::Other)?;

    if access == Access::ReadWrite {
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            error!("could not enable WAL mode: {err}");
        }
    }
    if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
        error!("could not enable foreign keys: {err}");
    }

    check_integrity(&conn)?;

    if access == Access::ReadWrite {
        run_migrations(&mut conn)
            .context("failed to run database migrations")
            .map_err(OpenError::Other)?;
    }

    Ok(conn)
}

fn check_integrity(conn: &Connection) -> std::result::Result<(), OpenError> {
    let verdict: String = match conn.query_row("PRAGMA quick_check", [], |row| row.get(0)) {
        Ok(verdict) => verdict,
        // A file that is not a database at all fails here rather than in the check.
        Err(rusqlite::Error::SqliteFailure(code, message))
            if matches!(
                code.code,
                rusqlite::ErrorCode::NotADatabase | rusqlite::ErrorCode::DatabaseCorrupt
            ) =>
        {
            return Err(OpenError::Corrupted(
                message.unwrap_or_else(|| code.to_string()),
            ))
        }
        Err(err) => {
            return Err(OpenError::Other(
                anyhow::Error::new(err).context("integrity check failed to run"),
            ))
        }
    };

    if verdict != "ok" {
        return Err(OpenError::Corrupted(verdict));
    }
    Ok(())
}
