pub mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::*;
pub use repositories::EntryFilter;

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use uuid::Uuid;

    /// A database path inside a fresh, not yet created, temp directory.
    pub fn scratch_db_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("hermes-db-{}", Uuid::new_v4()))
            .join("hermes.sqlite3")
    }
}
