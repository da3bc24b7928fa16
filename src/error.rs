use thiserror::Error;

/// Failure starting a single sensor feed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("{0} is not available on this device")]
    Unavailable(&'static str),

    #[error("{0} authorization was not granted")]
    PermissionDenied(&'static str),
}

/// Hermes core error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HermesError {
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    #[error("Store read failed: {0}")]
    StoreReadFailed(String),

    #[error("Store is corrupted: {0}")]
    StoreCorrupted(String),

    #[error("Connection to peripheral {peripheral} failed: {reason}")]
    ConnectionFailed { peripheral: String, reason: String },

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Invalid session name: {0:?}")]
    InvalidSessionName(String),

    #[error("A session named {0:?} already exists")]
    DuplicateSessionName(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HermesError {
    /// Errors after which the process must not keep using the store.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HermesError::StoreCorrupted(_))
    }

    pub(crate) fn write(err: anyhow::Error) -> Self {
        HermesError::StoreWriteFailed(format!("{err:#}"))
    }

    pub(crate) fn read(err: anyhow::Error) -> Self {
        HermesError::StoreReadFailed(format!("{err:#}"))
    }
}

impl From<FeedError> for HermesError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Unavailable(feed) => HermesError::SensorUnavailable(feed.to_string()),
            FeedError::PermissionDenied(feed) => HermesError::PermissionDenied(feed.to_string()),
        }
    }
}

/// Result type for Hermes operations
pub type Result<T> = std::result::Result<T, HermesError>;
