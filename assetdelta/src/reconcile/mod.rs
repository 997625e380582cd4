//! Content-hash reconciliation of two directory trees.

mod error;
mod hash;
mod prune;
mod reconciler;

pub use error::{ReconcileError, ReconcileResult};
pub use hash::{checksum_with_retry, file_checksum};
pub use prune::{prune_empty_dirs, PruneReport};
pub use reconciler::{
    compare_pair, reconcile, ReconcileConfig, ReconcileReport, ReconciliationPair,
    DEFAULT_HASH_CONCURRENCY,
};
