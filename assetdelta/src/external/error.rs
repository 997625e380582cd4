use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for external tool invocations.
pub type ExternalResult<T> = Result<T, ExternalError>;

/// Errors raised by external collaborators.
#[derive(Debug, Error)]
pub enum ExternalError {
    /// The command template is empty or unusable.
    #[error("invalid command template '{0}'")]
    InvalidTemplate(String),

    /// The tool could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },

    /// The tool ran and reported failure.
    #[error("{program} failed on {} ({status}): {stderr}", input.display())]
    Failed {
        program: String,
        input: PathBuf,
        status: String,
        stderr: String,
    },

    /// The tool succeeded but did not produce the expected output.
    #[error("{program} produced no output at {}", expected.display())]
    MissingOutput { program: String, expected: PathBuf },

    /// A directory for tool output could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },
}
