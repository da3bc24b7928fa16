pub mod context;
mod recorder;

pub use context::{LaunchOptions, LaunchReport, RecordingContext};
