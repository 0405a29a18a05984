//! Common error types for Depot.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Source file or stored object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A signed URL or token could not be parsed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Driver or registry configuration is missing or unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The storage backend reported a failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Whether this error means the target does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// A directory needed for a write could not be created.
///
/// Carried inside [`Error::Io`] with the kind of the underlying failure.
#[derive(Debug, Error)]
#[error("Directory \"{}\" was not created", .path.display())]
pub struct DirectoryNotCreated {
    /// Directory that was requested.
    pub path: PathBuf,
    /// Failure reported by the filesystem.
    #[source]
    pub source: std::io::Error,
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
