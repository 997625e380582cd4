use std::path::PathBuf;

use thiserror::Error;

use crate::external::ExternalError;
use crate::fetch::FetchError;
use crate::fsops::FsOpsError;
use crate::manifest::ManifestError;
use crate::reconcile::ReconcileError;
use crate::registry::RegistryError;
use crate::segment::SegmentError;

/// Result type for pipeline stages.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Whole-stage failures. Per-item problems are carried in stage summaries.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error(transparent)]
    FsOps(#[from] FsOpsError),

    /// The manifest for a release could not be downloaded.
    #[error("failed to fetch manifest for {version}: {reason}")]
    ManifestFetch { version: String, reason: String },

    /// A stage needs a collaborator that is not configured.
    #[error("no {0} configured (set it under [tools])")]
    MissingTool(&'static str),

    /// A stage input is missing on disk.
    #[error("missing input {}: run the {stage} stage first", path.display())]
    MissingInput { stage: &'static str, path: PathBuf },

    /// A worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    PoolBuild(String),
}
