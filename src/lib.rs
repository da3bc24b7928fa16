pub mod bluetooth;
pub mod config;
pub mod db;
pub mod delegate;
pub mod error;
pub mod export;
pub mod recording;
pub mod sensing;
pub mod settings;
pub mod store;
pub mod timer;
pub mod utils;

pub use config::HermesConfig;
pub use error::{FeedError, HermesError, Result};
pub use recording::{LaunchOptions, LaunchReport, RecordingContext};
pub use store::{EntryReader, EntryStore, SqliteStore};
pub use utils::init_logging;

#[cfg(test)]
mod integration_tests;
