pub mod entry;
pub mod geofence;
pub mod session;

pub use entry::{
    derive_state_string, AccelerometerEntry, ActivityFlags, ActivityState, Confidence, Entry,
    EntryKind, LocationEntry, MotionActivityEntry, StoredEntry,
};
pub use geofence::{Geofence, GeofenceEvent};
pub use session::{Session, SessionOrigin};
