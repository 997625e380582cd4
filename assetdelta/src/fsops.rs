//! Directory tree helpers: single-child chain flattening and file counts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Result type for tree helpers.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors raised while restructuring a tree.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// A directory listing failed.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// An entry could not be moved.
    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

/// Collapse every chain of single-child directories under (and including)
/// `root`.
///
/// A directory whose only entry is another directory takes over that
/// directory's contents: `root/a/b/c/file` with nothing else along the way
/// becomes `root/file`. Returns the number of directories removed.
pub fn flatten_single_child_dirs(root: &Path) -> FsOpsResult<usize> {
    let mut collapsed = 0;
    if root.is_dir() {
        flatten_dir(root, &mut collapsed)?;
    }
    debug!(root = %root.display(), collapsed, "Flattened directory chains");
    Ok(collapsed)
}

fn flatten_dir(dir: &Path, collapsed: &mut usize) -> FsOpsResult<()> {
    while let Some(only_child) = single_child_dir(dir)? {
        hoist_contents(dir, &only_child)?;
        *collapsed += 1;
    }

    for child in list_dir(dir)? {
        if child.is_dir() {
            flatten_dir(&child, collapsed)?;
        }
    }
    Ok(())
}

fn list_dir(dir: &Path) -> FsOpsResult<Vec<PathBuf>> {
    let read_err = |e| FsOpsError::ReadFailed {
        path: dir.to_path_buf(),
        source: e,
    };
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        entries.push(entry.map_err(read_err)?.path());
    }
    entries.sort();
    Ok(entries)
}

fn single_child_dir(dir: &Path) -> FsOpsResult<Option<PathBuf>> {
    let entries = list_dir(dir)?;
    match entries.as_slice() {
        [only] if only.is_dir() && !only.is_symlink() => Ok(Some(only.clone())),
        _ => Ok(None),
    }
}

/// Move `child`'s entries into `parent` and remove `child`.
///
/// `child` is first parked inside a scratch directory so an entry sharing
/// its name (`a/a/...`) can move up without colliding.
fn hoist_contents(parent: &Path, child: &Path) -> FsOpsResult<()> {
    let move_err = |from: &Path, to: &Path, e| FsOpsError::MoveFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    };

    let scratch = tempfile::Builder::new()
        .prefix(".flatten")
        .tempdir_in(parent)
        .map_err(|e| move_err(child, parent, e))?;
    let parked = scratch.path().join("d");
    fs::rename(child, &parked).map_err(|e| move_err(child, &parked, e))?;

    for entry in list_dir(&parked)? {
        let Some(name) = entry.file_name() else {
            continue;
        };
        let target = parent.join(name);
        fs::rename(&entry, &target).map_err(|e| move_err(&entry, &target, e))?;
    }

    debug!(dir = %parent.display(), from = %child.display(), "Hoisted single child");
    Ok(())
}

/// Count regular files under `dir`. A missing directory has none.
pub fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flatten_collapses_root_chain() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b/c")).unwrap();
        fs::write(temp.path().join("a/b/c/file.bin"), b"x").unwrap();

        let collapsed = flatten_single_child_dirs(temp.path()).unwrap();

        assert_eq!(collapsed, 3);
        assert!(temp.path().join("file.bin").exists());
        assert!(!temp.path().join("a").exists());
    }

    #[test]
    fn test_flatten_stops_at_branching_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("wrap/x/inner")).unwrap();
        fs::create_dir_all(temp.path().join("wrap/y")).unwrap();
        fs::write(temp.path().join("wrap/x/inner/1.bin"), b"1").unwrap();
        fs::write(temp.path().join("wrap/y/2.bin"), b"2").unwrap();

        flatten_single_child_dirs(temp.path()).unwrap();

        // root -> wrap collapses; x -> inner collapses; y holds a file
        assert!(temp.path().join("x/1.bin").exists());
        assert!(temp.path().join("y/2.bin").exists());
    }

    #[test]
    fn test_flatten_handles_same_name_nesting() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("top/a/a")).unwrap();
        fs::write(temp.path().join("top/a/a/f.bin"), b"f").unwrap();
        fs::write(temp.path().join("top/g.bin"), b"g").unwrap();

        flatten_single_child_dirs(temp.path()).unwrap();

        // root -> top collapses first, then a -> a
        assert!(temp.path().join("a/f.bin").exists());
        assert!(temp.path().join("g.bin").exists());
    }

    #[test]
    fn test_count_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("a"), b"a").unwrap();
        fs::write(temp.path().join("sub/b"), b"b").unwrap();

        assert_eq!(count_files(temp.path()), 2);
        assert_eq!(count_files(Path::new("/nonexistent/path")), 0);
    }
}
