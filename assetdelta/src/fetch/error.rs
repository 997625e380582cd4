//! Error types for the resilient fetcher.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::transport::TransportError;

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors raised while planning or performing object downloads.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The object id would resolve outside the destination root.
    #[error("invalid object id '{id}': {reason}")]
    InvalidObjectId { id: String, reason: String },

    /// The remote request failed.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    /// The response body stopped short.
    #[error("reading body of {url} failed: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: io::Error,
    },

    /// Failed to create a destination directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to read a local file.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write or finalize a local file.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    ClientBuild(String),

    /// The worker pool could not be started.
    #[error("failed to start fetch workers: {0}")]
    PoolBuild(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Timeouts, 5xx responses, connection resets and truncated bodies are
    /// transient. Local filesystem errors and 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_retryable(),
            Self::BodyRead { .. } => true,
            _ => false,
        }
    }
}
