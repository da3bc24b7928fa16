use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use crate::db::models::{Confidence, EntryKind, GeofenceEvent};
use crate::utils::time::parse_timestamp;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(value, field)
}

pub fn parse_kind(value: &str) -> Result<EntryKind> {
    EntryKind::parse(value).ok_or_else(|| anyhow!("unknown entry kind {value}"))
}

pub fn parse_confidence(value: i64) -> Result<Confidence> {
    Confidence::from_raw(value).ok_or_else(|| anyhow!("confidence out of range: {value}"))
}

pub fn parse_geofence_event(value: &str) -> Result<GeofenceEvent> {
    match value {
        "OnEntry" => Ok(GeofenceEvent::OnEntry),
        "OnExit" => Ok(GeofenceEvent::OnExit),
        other => Err(anyhow!("unknown geofence event type {other}")),
    }
}

/// SQLite has no boolean type; flags are stored as 0/1.
pub fn flag(value: i64) -> bool {
    value != 0
}
