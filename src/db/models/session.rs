//! Session data model.
//!
//! A session is a named recording run. The name is what users see and what
//! exports and entry queries filter on, so it is unique within a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::iso8601;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Why a session was opened without the user typing a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    /// The OS relaunched the app for a location event.
    BackgroundLaunch,
    /// The OS restored the Bluetooth central after suspending the app.
    BluetoothRestoration,
    /// A monitored geofence was crossed.
    Geofence,
}

impl SessionOrigin {
    pub fn suffix(&self) -> &'static str {
        match self {
            SessionOrigin::BackgroundLaunch => "Background Mode",
            SessionOrigin::BluetoothRestoration => "BT Background Mode",
            SessionOrigin::Geofence => "Geofence",
        }
    }

    /// e.g. `2018-10-23T14:05:09Z Background Mode`
    pub fn session_name(&self, at: &DateTime<Utc>) -> String {
        format!("{} {}", iso8601(at), self.suffix())
    }
}
