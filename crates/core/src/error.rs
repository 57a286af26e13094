//! Error types for the Ragstore workspace.
//!
//! One enum covers every failure the index manager can surface. The
//! variants that matter to callers are the index-lifecycle ones: embedding
//! failures, persistence failures, missing owner data, and the two
//! mutation outcomes that distinguish "operation fully failed" from
//! "records removed, index stale".

use thiserror::Error;

/// Unified error type for Ragstore.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The embedding provider was unreachable or returned an error.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Reading or writing a persisted index artifact failed.
    #[error("Persist error: {0}")]
    Persist(String),

    /// Canonical chunk store errors
    #[error("Chunk store error: {0}")]
    ChunkStore(String),

    /// No cached, persisted, or canonical data exists for the owner.
    #[error("No store for owner '{owner_id}'")]
    NoStoreForOwner { owner_id: String },

    /// Every add tier was exhausted.
    #[error("Adding texts for owner '{owner_id}' failed: {reason}")]
    AddFailed { owner_id: String, reason: String },

    /// Canonical records were removed but the index could not be rebuilt.
    #[error(
        "Removed {records_removed} chunk records of file '{file_id}' for owner '{owner_id}', \
         but the index is stale: {reason}"
    )]
    DeletePartial {
        owner_id: String,
        file_id: String,
        records_removed: usize,
        reason: String,
    },

    /// Caller supplied arguments that can never succeed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// True when the canonical store was mutated successfully and only the
    /// derived index is out of date.
    pub fn is_data_safe(&self) -> bool {
        matches!(self, AppError::DeletePartial { .. })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
