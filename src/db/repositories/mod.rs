mod entries;
mod geofences;
mod sessions;

pub use entries::EntryFilter;
