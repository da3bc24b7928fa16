use std::{path::PathBuf, time::Duration};

use log::warn;

pub const DEFAULT_RESTORE_IDENTIFIER: &str = "com.hermes.bluetooth.central";

/// Tunables for the acquisition core.
#[derive(Debug, Clone)]
pub struct HermesConfig {
    /// Directory holding the database and settings files
    pub data_dir: PathBuf,

    pub database_file: String,

    pub settings_file: String,

    /// Consecutive stationary ticks before recording stops on its own
    pub stationary_timeout_ticks: u32,

    pub stationary_tick: Duration,

    /// How often discovered peripherals are re-ranked
    pub ranking_interval: Duration,

    /// Accelerometer sampling period used when no preference is stored
    pub default_accelerometer_interval: Duration,

    pub bluetooth_restore_identifier: String,
}

impl Default for HermesConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::temp_dir().join("hermes"),
            database_file: "hermes.sqlite3".into(),
            settings_file: "settings.json".into(),
            stationary_timeout_ticks: 300,
            stationary_tick: Duration::from_secs(1),
            ranking_interval: Duration::from_secs(1),
            default_accelerometer_interval: Duration::from_secs_f64(1.0 / 60.0),
            bluetooth_restore_identifier: DEFAULT_RESTORE_IDENTIFIER.into(),
        }
    }
}

impl HermesConfig {
    /// Defaults with `HERMES_DATA_DIR` and `HERMES_STATIONARY_TIMEOUT_TICKS` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("HERMES_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        if let Ok(raw) = std::env::var("HERMES_STATIONARY_TIMEOUT_TICKS") {
            match raw.trim().parse::<u32>() {
                Ok(ticks) if ticks > 0 => config.stationary_timeout_ticks = ticks,
                _ => warn!("Ignoring invalid HERMES_STATIONARY_TIMEOUT_TICKS value {raw:?}"),
            }
        }

        config
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(&self.settings_file)
    }
}
