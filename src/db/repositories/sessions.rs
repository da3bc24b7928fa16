use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::parse_datetime,
    models::{Session, SessionOrigin},
};
use crate::utils::time::storage_timestamp;

fn row_to_session(row: &Row) -> Result<Session> {
    let created_at: String = row.get("created_at")?;

    Ok(Session {
        id: row.get("id")?,
        name: row.get("name")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

/// Inserts unless the name is taken. Returns whether a row was written.
fn insert_if_name_free(conn: &Connection, session: &Session) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO sessions (id, name, created_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO NOTHING",
        params![
            session.id,
            session.name,
            storage_timestamp(&session.created_at),
        ],
    )?;
    Ok(changed == 1)
}

impl Database {
    /// Inserts a session with a caller-chosen name. Returns `None` when a
    /// session with that name already exists.
    pub async fn insert_session(
        &self,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at,
        };
        self.execute(move |conn| {
            if insert_if_name_free(conn, &session)? {
                Ok(Some(session))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Inserts a session named after its origin and time, appending ` (2)`,
    /// ` (3)`, ... until the name is free.
    pub async fn insert_generated_session(
        &self,
        origin: SessionOrigin,
        created_at: DateTime<Utc>,
    ) -> Result<Session> {
        let base = origin.session_name(&created_at);
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut attempt: u32 = 1;
            let session = loop {
                let name = if attempt == 1 {
                    base.clone()
                } else {
                    format!("{base} ({attempt})")
                };
                let candidate = Session {
                    id: Uuid::new_v4().to_string(),
                    name,
                    created_at,
                };
                if insert_if_name_free(&tx, &candidate)? {
                    break candidate;
                }
                attempt += 1;
            };
            tx.commit()?;
            Ok(session)
        })
        .await
    }

    pub async fn find_session_by_name(&self, name: &str) -> Result<Option<Session>> {
        let name = name.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, created_at
                 FROM sessions
                 WHERE name = ?1",
            )?;

            stmt.query_row(params![name], |row| Ok(row_to_session(row)))
                .optional()?
                .transpose()
        })
        .await
    }

    /// Newest first.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, created_at
                 FROM sessions
                 ORDER BY created_at DESC, name ASC",
            )?;

            let rows = stmt.query_map([], |row| Ok(row_to_session(row)))?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row??);
            }
            Ok(sessions)
        })
        .await
    }

    /// Deletes the session and, through cascading keys, all of its entries.
    pub async fn delete_session_by_name(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.execute(move |conn| {
            let removed = conn.execute("DELETE FROM sessions WHERE name = ?1", params![name])?;
            Ok(removed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 10, 23, 14, 5, secs).unwrap()
    }

    #[tokio::test]
    async fn duplicate_names_are_not_inserted() {
        let db = Database::in_memory().unwrap();
        let first = db.insert_session("Commute", at(0)).await.unwrap();
        assert!(first.is_some());

        let second = db.insert_session("Commute", at(1)).await.unwrap();
        assert!(second.is_none());

        let found = db.find_session_by_name("Commute").await.unwrap().unwrap();
        assert_eq!(found, first.unwrap());
    }

    #[tokio::test]
    async fn generated_names_get_numeric_suffix() {
        let db = Database::in_memory().unwrap();
        let origin = SessionOrigin::BackgroundLaunch;

        let a = db.insert_generated_session(origin, at(9)).await.unwrap();
        let b = db.insert_generated_session(origin, at(9)).await.unwrap();
        let c = db.insert_generated_session(origin, at(9)).await.unwrap();

        assert_eq!(a.name, "2018-10-23T14:05:09Z Background Mode");
        assert_eq!(b.name, "2018-10-23T14:05:09Z Background Mode (2)");
        assert_eq!(c.name, "2018-10-23T14:05:09Z Background Mode (3)");
    }

    #[tokio::test]
    async fn list_is_newest_first_and_delete_reports_presence() {
        let db = Database::in_memory().unwrap();
        db.insert_session("older", at(1)).await.unwrap();
        db.insert_session("newer", at(2)).await.unwrap();

        let names: Vec<String> = db
            .list_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["newer", "older"]);

        assert!(db.delete_session_by_name("older").await.unwrap());
        assert!(!db.delete_session_by_name("older").await.unwrap());
        assert!(db.find_session_by_name("older").await.unwrap().is_none());
    }
}
