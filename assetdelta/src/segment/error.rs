//! Error types for segment reassembly.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for reassembly operations.
pub type SegmentResult<T> = Result<T, SegmentError>;

/// Errors raised while scanning or merging segment groups.
///
/// Every group-level variant names the group's output path.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The tree could not be walked.
    #[error("failed to scan {}: {reason}", path.display())]
    ScanFailed { path: PathBuf, reason: String },

    /// Two members of a group carry the same ordinal.
    #[error("segment group {} has duplicate ordinal {ordinal}", group.display())]
    DuplicateOrdinal { group: PathBuf, ordinal: u32 },

    /// The ordinal sequence of a group has a hole.
    #[error("segment group {} is missing ordinal {ordinal}", group.display())]
    MissingSegment { group: PathBuf, ordinal: u32 },

    /// A member could not be read during the merge.
    #[error("segment group {}: failed to read {}: {source}", group.display(), segment.display())]
    SegmentUnreadable {
        group: PathBuf,
        segment: PathBuf,
        source: io::Error,
    },

    /// The merged output could not be written or finalized.
    #[error("segment group {}: failed to write output: {source}", group.display())]
    WriteFailed { group: PathBuf, source: io::Error },

    /// A merged member could not be removed afterwards.
    #[error("failed to delete segment {}: {source}", path.display())]
    DeleteFailed { path: PathBuf, source: io::Error },
}
