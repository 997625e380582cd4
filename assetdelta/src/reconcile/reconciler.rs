//! Reference-vs-candidate tree comparison.
//!
//! The candidate tree holds freshly produced files; the reference tree holds
//! what the previous release produced at the same relative paths. Candidate
//! files whose content matches the reference are deleted, so whatever is
//! left afterwards is exactly the set that needs downstream processing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::{ReconcileError, ReconcileResult};
use super::hash::checksum_with_retry;
use super::prune::prune_empty_dirs;
use crate::retry::{is_transient_io, retry_with, RetryPolicy};

/// Default number of concurrent hash workers.
pub const DEFAULT_HASH_CONCURRENCY: usize = 4;

/// Reconciler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Maximum files hashed at once.
    pub concurrency: usize,
    /// Remove empty candidate directories afterwards.
    pub prune: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_HASH_CONCURRENCY,
            prune: true,
        }
    }
}

impl ReconcileConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hash concurrency (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Enable or disable the pruning pass.
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }
}

/// Hashes of one relative path present in both trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPair {
    pub relative: PathBuf,
    pub reference_hash: String,
    pub candidate_hash: String,
}

impl ReconciliationPair {
    /// Whether the candidate carries the same content as the reference.
    pub fn is_identical(&self) -> bool {
        self.reference_hash == self.candidate_hash
    }
}

/// Result of a reconciliation pass. Paths are relative to the trees.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Candidate files retained: new paths plus paths whose content differs.
    pub changed: Vec<PathBuf>,
    /// Candidate files deleted as identical to the reference.
    pub removed: Vec<PathBuf>,
    /// Empty directories removed afterwards.
    pub pruned_dirs: usize,
    /// Per-file problems. Files that could not be hashed are retained.
    pub errors: Vec<ReconcileError>,
}

enum Verdict {
    Changed(PathBuf),
    Removed(PathBuf),
    HashError(PathBuf, ReconcileError),
    DeleteError(ReconcileError),
}

/// Compare `candidate` against `reference` and delete unchanged files.
pub fn reconcile(
    reference: &Path,
    candidate: &Path,
    config: &ReconcileConfig,
) -> ReconcileResult<ReconcileReport> {
    reconcile_with(reference, candidate, config, compare_one)
}

fn reconcile_with<F>(
    reference: &Path,
    candidate: &Path,
    config: &ReconcileConfig,
    compare: F,
) -> ReconcileResult<ReconcileReport>
where
    F: Fn(&Path, &Path, &Path) -> Verdict + Sync,
{
    let files = candidate_files(candidate)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.concurrency)
        .thread_name(|i| format!("hash-{}", i))
        .build()
        .map_err(|e| ReconcileError::PoolBuild(e.to_string()))?;

    let changed = Mutex::new(Vec::new());
    let removed = Mutex::new(Vec::new());
    let errors = Mutex::new(Vec::new());

    pool.install(|| {
        files.par_iter().for_each(|relative| {
            match compare(reference, candidate, relative) {
                Verdict::Changed(p) => changed.lock().push(p),
                Verdict::Removed(p) => removed.lock().push(p),
                Verdict::HashError(p, e) => {
                    changed.lock().push(p);
                    errors.lock().push(e);
                }
                Verdict::DeleteError(e) => errors.lock().push(e),
            }
        });
    });

    let mut report = ReconcileReport {
        changed: changed.into_inner(),
        removed: removed.into_inner(),
        pruned_dirs: 0,
        errors: errors.into_inner(),
    };
    report.changed.sort();
    report.removed.sort();

    if config.prune {
        let pruned = prune_empty_dirs(candidate);
        report.pruned_dirs = pruned.removed;
        report.errors.extend(pruned.errors);
    }

    info!(
        candidate = %candidate.display(),
        files = files.len(),
        changed = report.changed.len(),
        removed = report.removed.len(),
        pruned_dirs = report.pruned_dirs,
        errors = report.errors.len(),
        "Reconciliation finished"
    );
    Ok(report)
}

/// Hash one path present in both trees.
pub fn compare_pair(
    reference: &Path,
    candidate: &Path,
    relative: &Path,
) -> ReconcileResult<ReconciliationPair> {
    Ok(ReconciliationPair {
        relative: relative.to_path_buf(),
        reference_hash: checksum_with_retry(&reference.join(relative))?,
        candidate_hash: checksum_with_retry(&candidate.join(relative))?,
    })
}

fn compare_one(reference: &Path, candidate: &Path, relative: &Path) -> Verdict {
    if !reference.join(relative).is_file() {
        return Verdict::Changed(relative.to_path_buf());
    }

    let pair = match compare_pair(reference, candidate, relative) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(path = %relative.display(), error = %e, "Hash failed, retaining file");
            return Verdict::HashError(relative.to_path_buf(), e);
        }
    };

    if !pair.is_identical() {
        return Verdict::Changed(pair.relative);
    }

    let target = candidate.join(relative);
    let deleted = retry_with(&RetryPolicy::locked_file(), is_transient_io, || {
        match fs::remove_file(&target) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    });

    match deleted.into_result() {
        Ok(()) => {
            debug!(path = %relative.display(), "Removed unchanged file");
            Verdict::Removed(pair.relative)
        }
        Err(source) => Verdict::DeleteError(ReconcileError::DeleteFailed {
            path: target,
            source,
        }),
    }
}

/// Relative paths of every file under `root`. A missing root has none.
fn candidate_files(root: &Path) -> ReconcileResult<Vec<PathBuf>> {
    if !root.exists() {
        debug!(root = %root.display(), "Candidate tree absent");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| ReconcileError::ScanFailed {
            path: e.path().unwrap_or(root).to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}
