use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GeofenceEvent {
    OnEntry,
    OnExit,
}

impl GeofenceEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeofenceEvent::OnEntry => "OnEntry",
            GeofenceEvent::OnExit => "OnExit",
        }
    }
}

/// A circular region the user asked to be notified about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub identifier: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Meters
    pub radius: f64,
    pub note: String,
    pub event_type: GeofenceEvent,
    pub created_at: DateTime<Utc>,
}
