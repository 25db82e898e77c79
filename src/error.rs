//! Error types for Historian-Archive

use thiserror::Error;

/// Result type alias for Historian-Archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Historian-Archive
#[derive(Error, Debug)]
pub enum Error {
    /// A time-tag, point id or count outside its valid domain
    #[error("Range error: {0}")]
    Range(String),

    /// No free or reusable block on a file that is not allowed to grow
    #[error("Archive full: all {block_count} blocks are allocated")]
    ArchiveFull { block_count: usize },

    /// Allocation table on disk is truncated or inconsistent
    #[error("Corrupt allocation table: {0}")]
    Corrupt(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
