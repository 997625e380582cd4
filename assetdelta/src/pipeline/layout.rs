//! Working directory layout.
//!
//! ```text
//! <work_dir>/
//! ├── registry.json
//! ├── manifests/<version>.txt
//! ├── diffs/diff_<old>_<new>.json
//! └── deltas/<old>_<new>/
//!     ├── failed_<version>.txt
//!     ├── raw/{added,changed-new,changed-old}/
//!     └── extracted/{added,changed-new,changed-old}/
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use crate::manifest::diff_record_name;
use crate::version::ReleaseVersion;

/// Which side of a comparison a set of objects belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Paths only present in the new release.
    Added,
    /// New content of changed paths.
    ChangedNew,
    /// Old content of changed paths, used as the reconciliation reference.
    ChangedOld,
}

impl Category {
    /// Every category in processing order.
    pub const ALL: [Category; 3] = [Category::Added, Category::ChangedNew, Category::ChangedOld];

    /// Directory name used under `raw/` and `extracted/`.
    pub fn dir_name(self) -> &'static str {
        match self {
            Category::Added => "added",
            Category::ChangedNew => "changed-new",
            Category::ChangedOld => "changed-old",
        }
    }

    /// Whether the category ends up in the delivered output.
    pub fn is_output(self) -> bool {
        !matches!(self, Category::ChangedOld)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Pure path helpers rooted at the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    pub fn manifest_path(&self, version: &ReleaseVersion) -> PathBuf {
        self.manifests_dir().join(format!("{}.txt", version))
    }

    pub fn diffs_dir(&self) -> PathBuf {
        self.root.join("diffs")
    }

    pub fn diff_record_path(&self, old: &ReleaseVersion, new: &ReleaseVersion) -> PathBuf {
        self.diffs_dir().join(diff_record_name(old, new))
    }

    /// Root of everything produced for one comparison.
    pub fn delta_dir(&self, old: &ReleaseVersion, new: &ReleaseVersion) -> PathBuf {
        self.root.join("deltas").join(format!("{}_{}", old, new))
    }

    /// Ids that failed to download from `source`'s URL during this comparison.
    pub fn failed_record_path(
        &self,
        old: &ReleaseVersion,
        new: &ReleaseVersion,
        source: &ReleaseVersion,
    ) -> PathBuf {
        self.delta_dir(old, new)
            .join(format!("failed_{}.txt", source))
    }

    pub fn raw_dir(
        &self,
        old: &ReleaseVersion,
        new: &ReleaseVersion,
        category: Category,
    ) -> PathBuf {
        self.delta_dir(old, new).join("raw").join(category.dir_name())
    }

    pub fn extracted_dir(
        &self,
        old: &ReleaseVersion,
        new: &ReleaseVersion,
        category: Category,
    ) -> PathBuf {
        self.delta_dir(old, new)
            .join("extracted")
            .join(category.dir_name())
    }
}
