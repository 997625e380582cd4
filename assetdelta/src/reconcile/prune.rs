//! Bottom-up removal of empty directories.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::error::ReconcileError;

/// Outcome of a prune pass.
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Directories removed.
    pub removed: usize,
    /// Directories that could not be removed.
    pub errors: Vec<ReconcileError>,
}

/// Remove every empty directory under `root`, deepest first.
///
/// `root` itself is kept. A directory that disappears mid-pass counts as
/// removed by someone else and is not an error.
pub fn prune_empty_dirs(root: &Path) -> PruneReport {
    let mut report = PruneReport::default();

    let mut directories: Vec<_> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(error = %err, "Skipping unreadable entry while pruning");
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .collect();

    directories.sort_by_key(walkdir::DirEntry::depth);
    directories.reverse();

    for entry in directories {
        let path = entry.path();
        let is_empty = match path.read_dir() {
            Ok(mut iter) => iter.next().is_none(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read directory");
                report.errors.push(ReconcileError::PruneFailed {
                    path: path.to_path_buf(),
                    source: e,
                });
                continue;
            }
        };
        if !is_empty {
            continue;
        }

        match fs::remove_dir(path) {
            Ok(()) => report.removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove empty directory");
                report.errors.push(ReconcileError::PruneFailed {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        }
    }

    debug!(root = %root.display(), removed = report.removed, "Pruned empty directories");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prunes_nested_empty_chain_keeps_root() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b/c")).unwrap();
        fs::create_dir_all(temp.path().join("d")).unwrap();

        let report = prune_empty_dirs(temp.path());

        assert_eq!(report.removed, 4);
        assert!(report.errors.is_empty());
        assert!(temp.path().exists());
        assert!(!temp.path().join("a").exists());
    }

    #[test]
    fn test_keeps_directories_with_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("keep/empty")).unwrap();
        fs::write(temp.path().join("keep/file.bin"), b"x").unwrap();

        let report = prune_empty_dirs(temp.path());

        assert_eq!(report.removed, 1);
        assert!(temp.path().join("keep/file.bin").exists());
        assert!(!temp.path().join("keep/empty").exists());
    }

    #[test]
    fn test_missing_root_is_noop() {
        let report = prune_empty_dirs(Path::new("/nonexistent/prune/root"));
        assert_eq!(report.removed, 0);
        assert!(report.errors.is_empty());
    }
}
