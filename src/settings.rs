use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::error::{HermesError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserSettings {
    /// Seconds between accelerometer samples; unset until the user picks one.
    #[serde(default)]
    update_interval: Option<f64>,
}

/// The persisted sampling preference, read by whoever starts the accelerometer.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))
                .map_err(HermesError::read)?;
            let data = serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "settings at {} are unreadable ({err}); falling back to defaults",
                    path.display()
                );
                UserSettings::default()
            });
            sanitized(data, &path)
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// The stored interval, if any.
    pub fn update_interval(&self) -> Option<Duration> {
        self.read()
            .update_interval
            .filter(|seconds| is_valid_interval(*seconds))
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
    }

    pub fn update_interval_or(&self, default: Duration) -> Duration {
        self.update_interval().unwrap_or(default)
    }

    pub fn set_update_interval(&self, seconds: f64) -> Result<()> {
        if !is_valid_interval(seconds) {
            return Err(HermesError::InvalidSetting(format!(
                "update interval must be a positive number of seconds, got {seconds}"
            )));
        }

        let mut guard = self.write();
        let previous = guard.update_interval.replace(seconds);
        if let Err(err) = self.persist(&guard) {
            guard.update_interval = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Re-reads the file, picking up changes written by the host app.
    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))
            .map_err(HermesError::read)?;
        let data: UserSettings = serde_json::from_str(&contents)
            .map_err(|err| HermesError::InvalidSetting(err.to_string()))?;
        *self.write() = sanitized(data, &self.path);
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)
            .map_err(|err| HermesError::Internal(err.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))
                .map_err(HermesError::write)?;
        }
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
            .map_err(HermesError::write)
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_valid_interval(seconds: f64) -> bool {
    seconds.is_finite() && seconds > 0.0 && Duration::try_from_secs_f64(seconds).is_ok()
}

/// Drops a stored interval that could not have come from `set_update_interval`.
fn sanitized(mut data: UserSettings, path: &Path) -> UserSettings {
    if let Some(seconds) = data.update_interval {
        if !is_valid_interval(seconds) {
            log::warn!(
                "ignoring update interval {seconds} in {}; using the default",
                path.display()
            );
            data.update_interval = None;
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("hermes-settings-{}", Uuid::new_v4()))
            .join("settings.json")
    }

    #[test]
    fn missing_file_yields_default() {
        let store = SettingsStore::new(scratch_path()).unwrap();
        assert_eq!(store.update_interval(), None);
        assert_eq!(
            store.update_interval_or(Duration::from_millis(20)),
            Duration::from_millis(20)
        );
    }

    #[test]
    fn interval_survives_reopen() {
        let path = scratch_path();
        let store = SettingsStore::new(path.clone()).unwrap();
        store.set_update_interval(0.1).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.update_interval(), Some(Duration::from_secs_f64(0.1)));
    }

    #[test]
    fn rejects_non_positive_interval() {
        let store = SettingsStore::new(scratch_path()).unwrap();
        assert!(matches!(
            store.set_update_interval(0.0),
            Err(HermesError::InvalidSetting(_))
        ));
        assert!(store.set_update_interval(f64::NAN).is_err());
        assert_eq!(store.update_interval(), None);
    }

    #[test]
    fn reload_picks_up_external_writes() {
        let path = scratch_path();
        let store = SettingsStore::new(path.clone()).unwrap();
        store.set_update_interval(0.5).unwrap();

        fs::write(&path, r#"{ "updateInterval": 0.25 }"#).unwrap();
        store.reload().unwrap();
        assert_eq!(store.update_interval(), Some(Duration::from_secs_f64(0.25)));
    }

    #[test]
    fn out_of_range_intervals_on_disk_are_ignored() {
        let path = scratch_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{ "updateInterval": -1 }"#).unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.update_interval(), None);

        fs::write(&path, r#"{ "updateInterval": 1e300 }"#).unwrap();
        store.reload().unwrap();
        assert_eq!(store.update_interval(), None);

        fs::write(&path, r#"{ "updateInterval": 0.2 }"#).unwrap();
        store.reload().unwrap();
        assert_eq!(store.update_interval(), Some(Duration::from_secs_f64(0.2)));
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let path = scratch_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.update_interval(), None);
    }
}
