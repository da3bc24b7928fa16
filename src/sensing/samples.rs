//! Raw samples as native backends deliver them, before they become entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{
    AccelerometerEntry, ActivityFlags, Confidence, GeofenceEvent, LocationEntry,
    MotionActivityEntry,
};

/// Acceleration in g along the device axes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccelerometerSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Degrees from true north; negative when invalid
    pub course: f64,
    /// Meters
    pub altitude: f64,
    /// Meters per second; negative when invalid
    pub speed: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MotionActivitySample {
    pub flags: ActivityFlags,
    pub confidence: Confidence,
    pub start_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LocationMode {
    /// Continuous best-accuracy updates.
    Continuous,
    /// Coarse updates the OS delivers even after relaunching the app.
    SignificantChanges,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedAlways,
    AuthorizedWhenInUse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircularRegion {
    pub identifier: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub notify_on_entry: bool,
    pub notify_on_exit: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Crossing {
    Entered,
    Exited,
}

/// Regions the OS can report on. Only circular regions are geofences.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitoredRegion {
    Circular(CircularRegion),
    Beacon { identifier: String },
}

impl MonitoredRegion {
    pub fn identifier(&self) -> &str {
        match self {
            MonitoredRegion::Circular(region) => &region.identifier,
            MonitoredRegion::Beacon { identifier } => identifier,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionEvent {
    pub region: MonitoredRegion,
    pub crossing: Crossing,
    pub timestamp: DateTime<Utc>,
}

impl CircularRegion {
    pub fn notifies(&self, crossing: Crossing) -> bool {
        match crossing {
            Crossing::Entered => self.notify_on_entry,
            Crossing::Exited => self.notify_on_exit,
        }
    }
}

impl From<&crate::db::Geofence> for CircularRegion {
    fn from(geofence: &crate::db::Geofence) -> Self {
        Self {
            identifier: geofence.identifier.clone(),
            latitude: geofence.latitude,
            longitude: geofence.longitude,
            radius: geofence.radius,
            notify_on_entry: geofence.event_type == GeofenceEvent::OnEntry,
            notify_on_exit: geofence.event_type == GeofenceEvent::OnExit,
        }
    }
}

impl From<AccelerometerSample> for AccelerometerEntry {
    fn from(sample: AccelerometerSample) -> Self {
        Self {
            x: sample.x,
            y: sample.y,
            z: sample.z,
            created_at: sample.timestamp,
        }
    }
}

impl LocationSample {
    pub fn into_entry(self, accelerometer: Option<AccelerometerSample>) -> LocationEntry {
        LocationEntry {
            latitude: self.latitude,
            longitude: self.longitude,
            course: self.course,
            altitude: self.altitude,
            speed: self.speed,
            created_at: self.timestamp,
            accelerometer: accelerometer.map(AccelerometerEntry::from),
        }
    }
}

impl MotionActivitySample {
    /// Motion entries are stamped when they are recorded; the activity's
    /// own start time is kept alongside.
    pub fn into_entry(self, recorded_at: DateTime<Utc>) -> MotionActivityEntry {
        MotionActivityEntry {
            flags: self.flags,
            confidence: self.confidence,
            started_at: self.start_date,
            created_at: recorded_at,
        }
    }
}
