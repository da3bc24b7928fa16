pub mod controller;
pub mod feeds;
mod loop_worker;
pub mod publisher;
pub mod samples;
pub mod simulated;

pub use controller::{
    SensorBackends, SessionControl, SessionEvent, SessionManager, SessionManagerOptions,
    SessionState, StartOutcome, StopReason,
};
pub use feeds::{
    AccelerometerBackend, AccelerometerFeed, LocationBackend, LocationFeed,
    MotionActivityBackend, MotionActivityFeed,
};
pub use publisher::SamplePublisher;
pub use samples::{
    AccelerometerSample, AuthorizationStatus, CircularRegion, Crossing, LocationMode,
    LocationSample, MonitoredRegion, MotionActivitySample, RegionEvent,
};
