//! Error types for the clerk ingestion pipeline.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using clerk's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for clerk operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// AI backend could not be reached, answered with a non-success status,
    /// or did not answer within the allotted time.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend answered but no task array could be recovered from it.
    #[error("Malformed extraction: {0}")]
    MalformedExtraction(String),

    /// A concurrent writer created the same (owner, name) key first.
    #[error("Conflict creating {entity} '{name}'")]
    ConflictOnCreate { entity: &'static str, name: String },

    /// Owner does not exist
    #[error("Owner not found: {0}")]
    OwnerNotFound(Uuid),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures the pipeline absorbs by switching to the fallback path.
    pub fn is_recoverable_extraction(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable(_) | Error::MalformedExtraction(_)
        )
    }

    /// True when a get-or-create lost the race to another writer.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::ConflictOnCreate { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::BackendUnavailable(format!("request timed out: {}", e))
        } else {
            Error::BackendUnavailable(e.to_string())
        }
    }
}
