//! Entry data models.
//!
//! An entry is one normalized sensor observation inside a session. Location
//! entries may own the accelerometer reading that was current when the
//! location arrived; that reading is also an entry of the session on its own.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification flags reported by the motion coprocessor. Several can be
/// true at once; [`ActivityFlags::state`] picks one.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFlags {
    pub stationary: bool,
    pub walking: bool,
    pub running: bool,
    pub automotive: bool,
    pub cycling: bool,
    pub unknown: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    Stationary,
    Walking,
    Running,
    Automotive,
    Cycling,
    Unknown,
}

impl ActivityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::Stationary => "stationary",
            ActivityState::Walking => "walking",
            ActivityState::Running => "running",
            ActivityState::Automotive => "automotive",
            ActivityState::Cycling => "cycling",
            ActivityState::Unknown => "unknown",
        }
    }
}

impl ActivityFlags {
    /// First true flag in the order stationary, walking, running, automotive,
    /// cycling; `Unknown` otherwise. The `unknown` flag itself never wins over
    /// a concrete classification.
    pub fn state(&self) -> ActivityState {
        if self.stationary {
            ActivityState::Stationary
        } else if self.walking {
            ActivityState::Walking
        } else if self.running {
            ActivityState::Running
        } else if self.automotive {
            ActivityState::Automotive
        } else if self.cycling {
            ActivityState::Cycling
        } else {
            ActivityState::Unknown
        }
    }

    /// Automotive, running or cycling.
    pub fn is_moving(&self) -> bool {
        self.automotive || self.running || self.cycling
    }
}

pub fn derive_state_string(flags: &ActivityFlags) -> &'static str {
    flags.state().as_str()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl Confidence {
    pub fn from_raw(value: i64) -> Option<Self> {
        match value {
            0 => Some(Confidence::Low),
            1 => Some(Confidence::Medium),
            2 => Some(Confidence::High),
            _ => None,
        }
    }

    pub fn raw(&self) -> i64 {
        *self as i64
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccelerometerEntry {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationEntry {
    pub latitude: f64,
    pub longitude: f64,
    pub course: f64,
    pub altitude: f64,
    pub speed: f64,
    pub created_at: DateTime<Utc>,
    pub accelerometer: Option<AccelerometerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MotionActivityEntry {
    pub flags: ActivityFlags,
    pub confidence: Confidence,
    pub started_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl MotionActivityEntry {
    pub fn state_string(&self) -> &'static str {
        derive_state_string(&self.flags)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Entry {
    Location(LocationEntry),
    MotionActivity(MotionActivityEntry),
    Accelerometer(AccelerometerEntry),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Location,
    MotionActivity,
    Accelerometer,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Location => "location",
            EntryKind::MotionActivity => "motion_activity",
            EntryKind::Accelerometer => "accelerometer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "location" => Some(EntryKind::Location),
            "motion_activity" => Some(EntryKind::MotionActivity),
            "accelerometer" => Some(EntryKind::Accelerometer),
            _ => None,
        }
    }
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Location(_) => EntryKind::Location,
            Entry::MotionActivity(_) => EntryKind::MotionActivity,
            Entry::Accelerometer(_) => EntryKind::Accelerometer,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Entry::Location(entry) => entry.created_at,
            Entry::MotionActivity(entry) => entry.created_at,
            Entry::Accelerometer(entry) => entry.created_at,
        }
    }
}

/// An entry read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntry {
    pub id: i64,
    pub session_id: String,
    pub entry: Entry,
}

fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl fmt::Display for AccelerometerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Accelerometer: {:.3}, {:.3}, {:.3}", self.x, self.y, self.z)
    }
}

impl fmt::Display for LocationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Location: (lat: {:.3}, lon: {:.3}, course: {:.3}, speed: {:.3}, altitude: {:.3})",
            self.latitude, self.longitude, self.course, self.speed, self.altitude
        )
    }
}

impl fmt::Display for MotionActivityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} with {} confidence",
            capitalize_first(self.state_string()),
            self.confidence.as_str()
        )
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Location(entry) => entry.fmt(f),
            Entry::MotionActivity(entry) => entry.fmt(f),
            Entry::Accelerometer(entry) => entry.fmt(f),
        }
    }
}
