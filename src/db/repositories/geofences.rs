use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_geofence_event},
    models::Geofence,
};
use crate::utils::time::storage_timestamp;

fn row_to_geofence(row: &Row) -> Result<Geofence> {
    let event_type: String = row.get("event_type")?;
    let created_at: String = row.get("created_at")?;

    Ok(Geofence {
        identifier: row.get("identifier")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        radius: row.get("radius")?,
        note: row.get("note")?,
        event_type: parse_geofence_event(&event_type)?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Inserts or replaces the geofence with the same identifier.
    pub async fn upsert_geofence(&self, geofence: &Geofence) -> Result<()> {
        let record = geofence.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO geofences (identifier, latitude, longitude, radius, note, event_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(identifier) DO UPDATE SET
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    radius = excluded.radius,
                    note = excluded.note,
                    event_type = excluded.event_type",
                params![
                    record.identifier,
                    record.latitude,
                    record.longitude,
                    record.radius,
                    record.note,
                    record.event_type.as_str(),
                    storage_timestamp(&record.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_geofences(&self) -> Result<Vec<Geofence>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT identifier, latitude, longitude, radius, note, event_type, created_at
                 FROM geofences
                 ORDER BY created_at ASC, identifier ASC",
            )?;

            let rows = stmt.query_map([], |row| Ok(row_to_geofence(row)))?;
            let mut geofences = Vec::new();
            for row in rows {
                geofences.push(row??);
            }
            Ok(geofences)
        })
        .await
    }

    pub async fn delete_geofence(&self, identifier: &str) -> Result<bool> {
        let identifier = identifier.to_string();
        self.execute(move |conn| {
            let removed = conn.execute(
                "DELETE FROM geofences WHERE identifier = ?1",
                params![identifier],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::GeofenceEvent;
    use chrono::Utc;

    fn home() -> Geofence {
        Geofence {
            identifier: "5C1D6F02-0000-4000-8000-000000000001".into(),
            latitude: 51.5007,
            longitude: -0.1246,
            radius: 150.0,
            note: "Home".into(),
            event_type: GeofenceEvent::OnEntry,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_identifier() {
        let db = Database::in_memory().unwrap();
        let mut fence = home();
        db.upsert_geofence(&fence).await.unwrap();

        fence.event_type = GeofenceEvent::OnExit;
        fence.radius = 300.0;
        db.upsert_geofence(&fence).await.unwrap();

        let stored = db.list_geofences().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type, GeofenceEvent::OnExit);
        assert_eq!(stored[0].radius, 300.0);
    }

    #[tokio::test]
    async fn zero_radius_is_rejected() {
        let db = Database::in_memory().unwrap();
        let mut fence = home();
        fence.radius = 0.0;
        assert!(db.upsert_geofence(&fence).await.is_err());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let db = Database::in_memory().unwrap();
        db.upsert_geofence(&home()).await.unwrap();
        assert!(db.delete_geofence(&home().identifier).await.unwrap());
        assert!(!db.delete_geofence(&home().identifier).await.unwrap());
    }
}
