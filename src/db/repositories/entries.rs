use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row, Transaction};

use crate::db::{
    connection::Database,
    helpers::{flag, parse_confidence, parse_datetime, parse_kind},
    models::{
        AccelerometerEntry, ActivityFlags, Entry, EntryKind, LocationEntry, MotionActivityEntry,
        StoredEntry,
    },
};
use crate::utils::time::storage_timestamp;

/// Which entries a batch delete removes. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    pub session_name: Option<String>,
    pub kind: Option<EntryKind>,
    /// Entries created strictly before this instant
    pub created_before: Option<DateTime<Utc>>,
}

const ENTRY_COLUMNS: &str = "
    e.id AS id,
    e.session_id AS session_id,
    e.kind AS kind,
    e.created_at AS created_at,
    l.latitude AS latitude,
    l.longitude AS longitude,
    l.course AS course,
    l.altitude AS altitude,
    l.speed AS speed,
    pe.created_at AS paired_created_at,
    pa.x AS paired_x,
    pa.y AS paired_y,
    pa.z AS paired_z,
    m.stationary AS stationary,
    m.walking AS walking,
    m.running AS running,
    m.automotive AS automotive,
    m.cycling AS cycling,
    m.unknown AS unknown,
    m.confidence AS confidence,
    m.started_at AS started_at,
    a.x AS accel_x,
    a.y AS accel_y,
    a.z AS accel_z";

const ENTRY_JOINS: &str = "
    FROM entries e
    JOIN sessions s ON s.id = e.session_id
    LEFT JOIN location_entries l ON l.entry_id = e.id
    LEFT JOIN entries pe ON pe.id = l.accelerometer_entry_id
    LEFT JOIN accelerometer_entries pa ON pa.entry_id = l.accelerometer_entry_id
    LEFT JOIN motion_activity_entries m ON m.entry_id = e.id
    LEFT JOIN accelerometer_entries a ON a.entry_id = e.id";

fn row_to_entry(row: &Row) -> Result<StoredEntry> {
    let kind: String = row.get("kind")?;
    let created_at: String = row.get("created_at")?;
    let created_at = parse_datetime(&created_at, "created_at")?;

    let entry = match parse_kind(&kind)? {
        EntryKind::Location => {
            let paired_created_at: Option<String> = row.get("paired_created_at")?;
            let accelerometer = match paired_created_at {
                Some(raw) => Some(AccelerometerEntry {
                    x: row.get("paired_x")?,
                    y: row.get("paired_y")?,
                    z: row.get("paired_z")?,
                    created_at: parse_datetime(&raw, "paired created_at")?,
                }),
                None => None,
            };
            Entry::Location(LocationEntry {
                latitude: row.get("latitude")?,
                longitude: row.get("longitude")?,
                course: row.get("course")?,
                altitude: row.get("altitude")?,
                speed: row.get("speed")?,
                created_at,
                accelerometer,
            })
        }
        EntryKind::MotionActivity => {
            let started_at: String = row.get("started_at")?;
            Entry::MotionActivity(MotionActivityEntry {
                flags: ActivityFlags {
                    stationary: flag(row.get("stationary")?),
                    walking: flag(row.get("walking")?),
                    running: flag(row.get("running")?),
                    automotive: flag(row.get("automotive")?),
                    cycling: flag(row.get("cycling")?),
                    unknown: flag(row.get("unknown")?),
                },
                confidence: parse_confidence(row.get("confidence")?)?,
                started_at: parse_datetime(&started_at, "started_at")?,
                created_at,
            })
        }
        EntryKind::Accelerometer => Entry::Accelerometer(AccelerometerEntry {
            x: row.get("accel_x")?,
            y: row.get("accel_y")?,
            z: row.get("accel_z")?,
            created_at,
        }),
    };

    Ok(StoredEntry {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        entry,
    })
}

fn insert_entry_row(
    tx: &Transaction<'_>,
    session_id: &str,
    kind: EntryKind,
    created_at: &DateTime<Utc>,
) -> Result<i64> {
    tx.execute(
        "INSERT INTO entries (session_id, kind, created_at) VALUES (?1, ?2, ?3)",
        params![session_id, kind.as_str(), storage_timestamp(created_at)],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_accelerometer(
    tx: &Transaction<'_>,
    session_id: &str,
    sample: &AccelerometerEntry,
) -> Result<i64> {
    let id = insert_entry_row(tx, session_id, EntryKind::Accelerometer, &sample.created_at)?;
    tx.execute(
        "INSERT INTO accelerometer_entries (entry_id, x, y, z) VALUES (?1, ?2, ?3, ?4)",
        params![id, sample.x, sample.y, sample.z],
    )?;
    Ok(id)
}

fn insert_entry(tx: &Transaction<'_>, session_id: &str, entry: &Entry) -> Result<i64> {
    match entry {
        Entry::Accelerometer(sample) => insert_accelerometer(tx, session_id, sample),
        Entry::Location(location) => {
            // The paired reading is an entry of the session in its own right.
            let paired_id = match &location.accelerometer {
                Some(sample) => Some(insert_accelerometer(tx, session_id, sample)?),
                None => None,
            };
            let id = insert_entry_row(tx, session_id, EntryKind::Location, &location.created_at)?;
            tx.execute(
                "INSERT INTO location_entries (
                    entry_id, latitude, longitude, course, altitude, speed, accelerometer_entry_id
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    location.latitude,
                    location.longitude,
                    location.course,
                    location.altitude,
                    location.speed,
                    paired_id,
                ],
            )?;
            Ok(id)
        }
        Entry::MotionActivity(activity) => {
            let id = insert_entry_row(
                tx,
                session_id,
                EntryKind::MotionActivity,
                &activity.created_at,
            )?;
            let flags = &activity.flags;
            tx.execute(
                "INSERT INTO motion_activity_entries (
                    entry_id, stationary, walking, running, automotive, cycling, unknown,
                    confidence, started_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    flags.stationary,
                    flags.walking,
                    flags.running,
                    flags.automotive,
                    flags.cycling,
                    flags.unknown,
                    activity.confidence.raw(),
                    storage_timestamp(&activity.started_at),
                ],
            )?;
            Ok(id)
        }
    }
}

impl Database {
    /// Inserts a batch of entries for one session in a single transaction.
    /// Returns the ids of the top-level entries in input order.
    pub async fn insert_entries(&self, session_id: &str, entries: Vec<Entry>) -> Result<Vec<i64>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut ids = Vec::with_capacity(entries.len());
            for entry in &entries {
                ids.push(insert_entry(&tx, &session_id, entry)?);
            }
            tx.commit()?;
            Ok(ids)
        })
        .await
    }

    /// Entries of the named session, newest first. Equal timestamps fall back
    /// to insertion order, newest first.
    pub async fn get_entries_for_session(
        &self,
        session_name: &str,
        kind: Option<EntryKind>,
    ) -> Result<Vec<StoredEntry>> {
        let session_name = session_name.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} {ENTRY_JOINS}
                 WHERE s.name = ?1 AND (?2 IS NULL OR e.kind = ?2)
                 ORDER BY e.created_at DESC, e.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![session_name, kind.map(|k| k.as_str())],
                |row| Ok(row_to_entry(row)),
            )?;

            let mut entries = Vec::new();
            for row in rows {
                entries.push(row??);
            }
            Ok(entries)
        })
        .await
    }

    pub async fn get_location_entries(&self, session_name: &str) -> Result<Vec<LocationEntry>> {
        let entries = self
            .get_entries_for_session(session_name, Some(EntryKind::Location))
            .await?;
        entries
            .into_iter()
            .map(|stored| match stored.entry {
                Entry::Location(location) => Ok(location),
                other => Err(anyhow!("expected location entry, found {:?}", other.kind())),
            })
            .collect()
    }

    pub async fn get_motion_activity_entries(
        &self,
        session_name: &str,
    ) -> Result<Vec<MotionActivityEntry>> {
        let entries = self
            .get_entries_for_session(session_name, Some(EntryKind::MotionActivity))
            .await?;
        entries
            .into_iter()
            .map(|stored| match stored.entry {
                Entry::MotionActivity(activity) => Ok(activity),
                other => Err(anyhow!(
                    "expected motion activity entry, found {:?}",
                    other.kind()
                )),
            })
            .collect()
    }

    /// Deletes every entry matching `filter`. Deleting a location entry also
    /// deletes its paired accelerometer reading. Returns the number of
    /// matched entries.
    pub async fn delete_entries(&self, filter: EntryFilter) -> Result<usize> {
        self.execute(move |conn| {
            let removed = conn.execute(
                "DELETE FROM entries
                 WHERE (?1 IS NULL OR session_id IN (SELECT id FROM sessions WHERE name = ?1))
                   AND (?2 IS NULL OR kind = ?2)
                   AND (?3 IS NULL OR created_at < ?3)",
                params![
                    filter.session_name,
                    filter.kind.map(|k| k.as_str()),
                    filter.created_before.as_ref().map(storage_timestamp),
                ],
            )?;
            Ok(removed)
        })
        .await
    }
}
