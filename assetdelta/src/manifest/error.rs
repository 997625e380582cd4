//! Error types for manifest parsing and diff persistence.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors that can occur while loading manifests or diff records.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read a manifest or diff record.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a diff record.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// The manifest text contained no `path @hash` entries.
    #[error("manifest {origin} contains no valid entries")]
    Empty { origin: String },

    /// A persisted diff record could not be decoded.
    #[error("malformed diff record {}: {reason}", path.display())]
    MalformedRecord { path: PathBuf, reason: String },
}
