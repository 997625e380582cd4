//! End-to-end delta pipeline.
//!
//! Wires the building blocks together for one `old -> new` comparison:
//!
//! ```text
//! fetch manifests ──> diff ──> download delta ──> extract ──> reassemble
//!                                                                │
//!                    flatten <── reconcile <── decode <──────────┘
//! ```
//!
//! Every stage re-scans the working directory instead of keeping an index,
//! so any stage can be re-run on its own after fixing a failure.

mod decode;
mod error;
mod layout;
mod runner;
mod summary;

pub use decode::{decode_tree, DecodeSettings, DEFAULT_DECODE_CONCURRENCY};
pub use error::{PipelineError, PipelineResult};
pub use layout::{Category, WorkspaceLayout};
pub use runner::{Pipeline, DEFAULT_MANIFEST_PATH};
pub use summary::{
    DecodeFailure, DecodeSummary, DiffSummary, DownloadSummary, ExtractSummary, FlattenSummary,
    ManifestSummary, ReassembleSummary, RunSummary,
};
