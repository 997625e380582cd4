//! Error types for tree reconciliation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors raised while comparing or pruning trees.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A tree could not be walked.
    #[error("failed to scan {}: {reason}", path.display())]
    ScanFailed { path: PathBuf, reason: String },

    /// A file could not be hashed.
    #[error("failed to hash {}: {source}", path.display())]
    HashFailed { path: PathBuf, source: io::Error },

    /// An unchanged candidate file could not be deleted.
    #[error("failed to delete {}: {source}", path.display())]
    DeleteFailed { path: PathBuf, source: io::Error },

    /// An empty directory could not be removed.
    #[error("failed to remove directory {}: {source}", path.display())]
    PruneFailed { path: PathBuf, source: io::Error },

    /// The hashing pool could not be started.
    #[error("failed to start hash workers: {0}")]
    PoolBuild(String),
}
