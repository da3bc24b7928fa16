//! Durable store seam.
//!
//! The recorder and the exporter only see these traits. [`SqliteStore`] is the
//! shipped implementation; it converts the database layer's `anyhow` errors
//! into [`HermesError`] kinds at this boundary.

use std::future::Future;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::db::{
    Database, Entry, EntryFilter, EntryKind, Geofence, LocationEntry, MotionActivityEntry,
    Session, SessionOrigin, StoredEntry,
};
use crate::error::{HermesError, Result};

/// Read side used by exports.
pub trait EntryReader: Send + Sync + 'static {
    /// Location entries of the named session, newest first.
    fn location_entries(
        &self,
        session_name: &str,
    ) -> impl Future<Output = Result<Vec<LocationEntry>>> + Send;

    /// Motion activity entries of the named session, newest first.
    fn motion_activity_entries(
        &self,
        session_name: &str,
    ) -> impl Future<Output = Result<Vec<MotionActivityEntry>>> + Send;
}

pub trait EntryStore: EntryReader + Clone {
    /// Creates a session with a user-chosen name. Blank names are
    /// `InvalidSessionName`, taken names `DuplicateSessionName`.
    fn create_session(
        &self,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Session>> + Send;

    /// Creates a session named after `origin` and `created_at`.
    fn create_generated_session(
        &self,
        origin: SessionOrigin,
        created_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Session>> + Send;

    fn find_session(&self, name: &str) -> impl Future<Output = Result<Option<Session>>> + Send;

    fn list_sessions(&self) -> impl Future<Output = Result<Vec<Session>>> + Send;

    /// Appends entries to a session in one transaction; either all are
    /// stored or none.
    fn append_entries(
        &self,
        session: &Session,
        entries: Vec<Entry>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// All entries of the named session, newest first, optionally of a
    /// single kind.
    fn entries(
        &self,
        session_name: &str,
        kind: Option<EntryKind>,
    ) -> impl Future<Output = Result<Vec<StoredEntry>>> + Send;

    fn delete_entries(&self, filter: EntryFilter) -> impl Future<Output = Result<usize>> + Send;

    /// Deletes the session and everything it owns.
    fn delete_session(&self, name: &str) -> impl Future<Output = Result<()>> + Send;

    fn save_geofence(&self, geofence: &Geofence) -> impl Future<Output = Result<()>> + Send;

    fn geofences(&self) -> impl Future<Output = Result<Vec<Geofence>>> + Send;

    fn delete_geofence(&self, identifier: &str) -> impl Future<Output = Result<bool>> + Send;
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Opens or creates the store file, running pending migrations. A file
    /// that fails the integrity check yields `StoreCorrupted`.
    pub fn open(path: PathBuf) -> Result<Self> {
        Ok(Self {
            db: Database::new(path)?,
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            db: Database::in_memory()?,
        })
    }

    /// A handle on a separate read-only connection.
    pub fn reader(&self) -> Result<Self> {
        Ok(Self {
            db: self.db.reader()?,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(HermesError::InvalidSessionName(name.to_string()));
    }
    Ok(trimmed)
}

impl EntryReader for SqliteStore {
    async fn location_entries(&self, session_name: &str) -> Result<Vec<LocationEntry>> {
        self.db
            .get_location_entries(session_name)
            .await
            .map_err(HermesError::read)
    }

    async fn motion_activity_entries(&self, session_name: &str) -> Result<Vec<MotionActivityEntry>> {
        self.db
            .get_motion_activity_entries(session_name)
            .await
            .map_err(HermesError::read)
    }
}

impl EntryStore for SqliteStore {
    async fn create_session(&self, name: &str, created_at: DateTime<Utc>) -> Result<Session> {
        let name = validate_name(name)?;
        self.db
            .insert_session(name, created_at)
            .await
            .map_err(HermesError::write)?
            .ok_or_else(|| HermesError::DuplicateSessionName(name.to_string()))
    }

    async fn create_generated_session(
        &self,
        origin: SessionOrigin,
        created_at: DateTime<Utc>,
    ) -> Result<Session> {
        self.db
            .insert_generated_session(origin, created_at)
            .await
            .map_err(HermesError::write)
    }

    async fn find_session(&self, name: &str) -> Result<Option<Session>> {
        self.db
            .find_session_by_name(name)
            .await
            .map_err(HermesError::read)
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.db.list_sessions().await.map_err(HermesError::read)
    }

    async fn append_entries(&self, session: &Session, entries: Vec<Entry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        for entry in &entries {
            if entry.created_at() < session.created_at {
                log::warn!(
                    "{} entry at {} predates session {:?} created at {}",
                    entry.kind().as_str(),
                    entry.created_at(),
                    session.name,
                    session.created_at
                );
            }
        }
        self.db
            .insert_entries(&session.id, entries)
            .await
            .map(|_| ())
            .map_err(HermesError::write)
    }

    async fn entries(&self, session_name: &str, kind: Option<EntryKind>) -> Result<Vec<StoredEntry>> {
        self.db
            .get_entries_for_session(session_name, kind)
            .await
            .map_err(HermesError::read)
    }

    async fn delete_entries(&self, filter: EntryFilter) -> Result<usize> {
        self.db
            .delete_entries(filter)
            .await
            .map_err(HermesError::write)
    }

    async fn delete_session(&self, name: &str) -> Result<()> {
        let removed = self
            .db
            .delete_session_by_name(name)
            .await
            .map_err(HermesError::write)?;
        if removed {
            Ok(())
        } else {
            Err(HermesError::SessionNotFound(name.to_string()))
        }
    }

    async fn save_geofence(&self, geofence: &Geofence) -> Result<()> {
        self.db
            .upsert_geofence(geofence)
            .await
            .map_err(HermesError::write)
    }

    async fn geofences(&self) -> Result<Vec<Geofence>> {
        self.db.list_geofences().await.map_err(HermesError::read)
    }

    async fn delete_geofence(&self, identifier: &str) -> Result<bool> {
        self.db
            .delete_geofence(identifier)
            .await
            .map_err(HermesError::write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::scratch_db_path;
    use crate::db::AccelerometerEntry;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 10, 23, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn session_names_are_validated() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(
            store.create_session("   ", t0()).await.unwrap_err(),
            HermesError::InvalidSessionName("   ".into())
        );

        let session = store.create_session("  Morning run ", t0()).await.unwrap();
        assert_eq!(session.name, "Morning run");
        assert_eq!(
            store.create_session("Morning run", t0()).await.unwrap_err(),
            HermesError::DuplicateSessionName("Morning run".into())
        );
    }

    #[tokio::test]
    async fn deleting_unknown_session_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(
            store.delete_session("ghost").await.unwrap_err(),
            HermesError::SessionNotFound("ghost".into())
        );
    }

    #[tokio::test]
    async fn reader_sees_committed_entries() {
        let store = SqliteStore::open(scratch_db_path()).unwrap();
        let session = store.create_session("drive", t0()).await.unwrap();
        store
            .append_entries(
                &session,
                vec![Entry::Accelerometer(AccelerometerEntry {
                    x: 1.0,
                    y: 2.0,
                    z: 3.0,
                    created_at: t0() + Duration::seconds(1),
                })],
            )
            .await
            .unwrap();

        let reader = store.reader().unwrap();
        let entries = reader.entries("drive", None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(matches!(
            reader.create_session("other", t0()).await,
            Err(HermesError::StoreWriteFailed(_))
        ));
    }

    #[tokio::test]
    async fn append_to_deleted_session_fails_as_write_error() {
        let store = SqliteStore::in_memory().unwrap();
        let session = store.create_session("gone", t0()).await.unwrap();
        store.delete_session("gone").await.unwrap();

        let result = store
            .append_entries(
                &session,
                vec![Entry::Accelerometer(AccelerometerEntry {
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                    created_at: t0(),
                })],
            )
            .await;
        assert!(matches!(result, Err(HermesError::StoreWriteFailed(_))));
    }
}
