//! Manifest comparison and persisted diff records.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::{ManifestError, ManifestResult};
use super::hashed::HashedManifest;
use crate::version::ReleaseVersion;

/// Paths that appeared or changed between two manifests.
///
/// Both lists are sorted and duplicate-free, and never share a path.
/// Paths dropped from the newer manifest are not reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Present in the new manifest only.
    #[serde(rename = "new")]
    pub added: Vec<String>,
    /// Present in both with differing hashes.
    #[serde(rename = "change")]
    pub changed: Vec<String>,
}

impl DiffResult {
    /// Whether nothing needs fetching.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty()
    }

    /// Total number of paths to fetch.
    pub fn len(&self) -> usize {
        self.added.len() + self.changed.len()
    }
}

/// Compute the paths added or changed from `old` to `new`.
///
/// Runs in a single pass over `new`; output order follows the manifests'
/// path order, which is lexicographic.
pub fn diff(old: &HashedManifest, new: &HashedManifest) -> DiffResult {
    let mut result = DiffResult::default();

    for (path, hash) in new.iter() {
        match old.get(path) {
            None => result.added.push(path.to_string()),
            Some(old_hash) if old_hash != hash => result.changed.push(path.to_string()),
            Some(_) => {}
        }
    }

    debug!(
        old_entries = old.len(),
        new_entries = new.len(),
        added = result.added.len(),
        changed = result.changed.len(),
        "Computed manifest diff"
    );
    result
}

/// File name of the persisted diff between two versions.
pub fn diff_record_name(old: &ReleaseVersion, new: &ReleaseVersion) -> String {
    format!("diff_{}_{}.json", old, new)
}

/// Write a diff record as `{ "new": [...], "change": [...] }`.
pub fn save_diff_record(path: &Path, diff: &DiffResult) -> ManifestResult<()> {
    let write_err = |source| ManifestError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let json = serde_json::to_string_pretty(diff).map_err(|e| write_err(e.into()))?;
    fs::write(path, json).map_err(write_err)
}

/// Read a previously persisted diff record.
pub fn load_diff_record(path: &Path) -> ManifestResult<DiffResult> {
    let text = fs::read_to_string(path).map_err(|e| ManifestError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| ManifestError::MalformedRecord {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Diff two manifest files, reusing the record in `record_dir` if present.
///
/// Returns the diff and the path of its record.
pub fn diff_files(
    old_manifest: &Path,
    new_manifest: &Path,
    record_dir: &Path,
    old: &ReleaseVersion,
    new: &ReleaseVersion,
) -> ManifestResult<(DiffResult, PathBuf)> {
    let record_path = record_dir.join(diff_record_name(old, new));

    if record_path.is_file() {
        debug!(record = %record_path.display(), "Reusing existing diff record");
        return Ok((load_diff_record(&record_path)?, record_path));
    }

    let old_snapshot = HashedManifest::from_file(old_manifest)?;
    let new_snapshot = HashedManifest::from_file(new_manifest)?;
    let result = diff(&old_snapshot, &new_snapshot);
    save_diff_record(&record_path, &result)?;

    info!(
        old = %old,
        new = %new,
        added = result.added.len(),
        changed = result.changed.len(),
        record = %record_path.display(),
        "Saved diff record"
    );
    Ok((result, record_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn manifest(pairs: &[(&str, &str)]) -> HashedManifest {
        HashedManifest::from_entries(pairs.iter().copied())
    }

    #[test]
    fn test_diff_added_and_changed() {
        let a = manifest(&[("x.bin", "h1"), ("y.bin", "h2")]);
        let b = manifest(&[("x.bin", "h1"), ("y.bin", "h3"), ("z.bin", "h4")]);

        let result = diff(&a, &b);
        assert_eq!(result.added, vec!["z.bin"]);
        assert_eq!(result.changed, vec!["y.bin"]);
    }

    #[test]
    fn test_diff_empty_old_adds_everything() {
        let b = manifest(&[("b.bin", "h"), ("a.bin", "h")]);
        let result = diff(&HashedManifest::new(), &b);

        assert_eq!(result.added, vec!["a.bin", "b.bin"]);
        assert!(result.changed.is_empty());
    }

    #[test]
    fn test_diff_empty_new_reports_nothing() {
        let a = manifest(&[("a.bin", "h")]);
        assert!(diff(&a, &HashedManifest::new()).is_empty());
    }

    #[test]
    fn test_diff_record_roundtrip_uses_wire_names() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("diff_1_2.json");
        let result = DiffResult {
            added: vec!["z.bin".into()],
            changed: vec!["y.bin".into()],
        };

        save_diff_record(&path, &result).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"new\""));
        assert!(text.contains("\"change\""));
        assert_eq!(load_diff_record(&path).unwrap(), result);
    }

    #[test]
    fn test_diff_files_reuses_record() {
        let temp = TempDir::new().unwrap();
        let h = |c: char| std::iter::repeat(c).take(64).collect::<String>();
        let old_path = temp.path().join("1.txt");
        let new_path = temp.path().join("2.txt");
        fs::write(&old_path, format!("x.bin @{}\n", h('1'))).unwrap();
        fs::write(&new_path, format!("x.bin @{}\ny.bin @{}\n", h('2'), h('3'))).unwrap();

        let v1 = ReleaseVersion::parse("1").unwrap();
        let v2 = ReleaseVersion::parse("2").unwrap();
        let (first, record) = diff_files(&old_path, &new_path, temp.path(), &v1, &v2).unwrap();
        assert_eq!(first.added, vec!["y.bin"]);
        assert_eq!(first.changed, vec!["x.bin"]);
        assert!(record.ends_with("diff_1_2.json"));

        // Manifests vanish; the record alone answers the second call
        fs::remove_file(&old_path).unwrap();
        fs::remove_file(&new_path).unwrap();
        let (second, _) = diff_files(&old_path, &new_path, temp.path(), &v1, &v2).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_diff_files_rejects_empty_manifest() {
        let temp = TempDir::new().unwrap();
        let old_path = temp.path().join("1.txt");
        let new_path = temp.path().join("2.txt");
        fs::write(&old_path, "garbage\n").unwrap();
        fs::write(&new_path, "garbage\n").unwrap();

        let v1 = ReleaseVersion::parse("1").unwrap();
        let v2 = ReleaseVersion::parse("2").unwrap();
        let result = diff_files(&old_path, &new_path, temp.path(), &v1, &v2);
        assert!(matches!(result, Err(ManifestError::Empty { .. })));
    }

    fn arb_manifest() -> impl Strategy<Value = BTreeMap<String, String>> {
        prop::collection::btree_map("[a-d]{1,3}\\.bin", "h[0-3]", 0..20)
    }

    proptest! {
        #[test]
        fn prop_diff_correctness(a in arb_manifest(), b in arb_manifest()) {
            let old = HashedManifest::from_entries(a.clone());
            let new = HashedManifest::from_entries(b.clone());
            let result = diff(&old, &new);

            for path in &result.added {
                prop_assert!(!a.contains_key(path));
                prop_assert!(b.contains_key(path));
            }
            for path in &result.changed {
                prop_assert!(a.contains_key(path) && b.contains_key(path));
                prop_assert_ne!(&a[path], &b[path]);
                prop_assert!(!result.added.contains(path));
            }

            let mut sorted = result.added.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(&sorted, &result.added);

            let mut sorted = result.changed.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(&sorted, &result.changed);
        }

        #[test]
        fn prop_diff_identity(a in arb_manifest()) {
            let m = HashedManifest::from_entries(a);
            prop_assert!(diff(&m, &m).is_empty());
        }
    }
}
