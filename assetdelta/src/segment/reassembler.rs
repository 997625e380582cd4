//! Detection and concatenation of segmented files.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::{SegmentError, SegmentResult};
use super::naming::parse_segment_name;
use crate::retry::{is_transient_io, retry_with, RetryPolicy};

/// Buffer size for streaming segments (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Suffix of in-progress merge outputs.
const MERGE_SUFFIX: &str = ".merge";

/// Files from one directory that form a single logical artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentGroup {
    /// Directory holding every member.
    pub dir: PathBuf,
    /// File name of the reassembled artifact.
    pub identity: String,
    /// `(ordinal, path)` pairs sorted by ordinal.
    pub members: Vec<(u32, PathBuf)>,
}

impl SegmentGroup {
    /// Path of the artifact when reassembled in place.
    pub fn output_path(&self) -> PathBuf {
        self.dir.join(&self.identity)
    }

    /// Whether the group is a lone unsuffixed file that needs no merge.
    pub fn is_single(&self) -> bool {
        self.members.len() == 1 && self.members[0].0 == 0
    }

    /// Check that ordinals are unique and contiguous.
    ///
    /// A sequence may start at 0 (the unsuffixed file leads) or at 1.
    pub fn validate(&self) -> SegmentResult<()> {
        let group = self.output_path();
        let mut expected = match self.members.first() {
            Some((0, _)) => 0,
            _ => 1,
        };

        for (ordinal, _) in &self.members {
            if *ordinal < expected {
                return Err(SegmentError::DuplicateOrdinal {
                    group,
                    ordinal: *ordinal,
                });
            }
            if *ordinal > expected {
                return Err(SegmentError::MissingSegment {
                    group,
                    ordinal: expected,
                });
            }
            expected += 1;
        }
        Ok(())
    }
}

/// Caller-selected reassembly behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReassemblyOptions {
    /// Write artifacts under this directory instead of in place. Lone files
    /// are copied there too.
    pub output_dir: Option<PathBuf>,
    /// Remove members after a successful merge.
    pub delete_sources: bool,
}

impl ReassemblyOptions {
    /// In-place reassembly keeping sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write outputs under `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Remove members after merging.
    pub fn with_delete_sources(mut self, delete: bool) -> Self {
        self.delete_sources = delete;
        self
    }
}

/// One merged artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedFile {
    pub output: PathBuf,
    pub segments: usize,
    pub bytes: u64,
}

/// Outcome of a reassembly pass.
#[derive(Debug, Default)]
pub struct ReassemblyReport {
    /// Artifacts produced from two or more members.
    pub merged: Vec<MergedFile>,
    /// Lone files copied to the output directory.
    pub copied: usize,
    /// In-place groups whose unsuffixed member already holds the merge.
    pub already_complete: usize,
    /// Groups that could not be merged, or members that could not be removed.
    pub failures: Vec<SegmentError>,
}

impl ReassemblyReport {
    /// Whether every group succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Walk `root` and group files by directory and identity.
///
/// Groups come back in path order.
pub fn scan_groups(root: &Path) -> SegmentResult<Vec<SegmentGroup>> {
    let mut groups: BTreeMap<(PathBuf, String), Vec<(u32, PathBuf)>> = BTreeMap::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| SegmentError::ScanFailed {
            path: e.path().unwrap_or(root).to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        let name = parse_segment_name(&file_name);
        let dir = entry
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        groups
            .entry((dir, name.identity))
            .or_default()
            .push((name.ordinal, entry.path().to_path_buf()));
    }

    Ok(groups
        .into_iter()
        .map(|((dir, identity), mut members)| {
            members.sort();
            SegmentGroup {
                dir,
                identity,
                members,
            }
        })
        .collect())
}

/// Concatenate a group's members, in ordinal order, into `output`.
///
/// The data goes to a temp file beside `output` that is moved into place
/// only after the last member; on any failure the temp file is removed and
/// `output` is left untouched. Returns the bytes written.
pub fn merge_group(group: &SegmentGroup, output: &Path) -> SegmentResult<u64> {
    let group_path = group.output_path();
    let write_err = |e| SegmentError::WriteFailed {
        group: group_path.clone(),
        source: e,
    };

    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(write_err)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".")
        .suffix(MERGE_SUFFIX)
        .tempfile_in(parent)
        .map_err(write_err)?;

    let mut total = 0u64;
    {
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, temp.as_file_mut());
        let mut buffer = vec![0u8; BUFFER_SIZE];

        for (_, segment) in &group.members {
            let unreadable = |e| SegmentError::SegmentUnreadable {
                group: group_path.clone(),
                segment: segment.clone(),
                source: e,
            };
            let mut reader = File::open(segment).map_err(unreadable)?;

            loop {
                let bytes_read = match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(unreadable(e)),
                };
                writer.write_all(&buffer[..bytes_read]).map_err(write_err)?;
                total += bytes_read as u64;
            }
        }

        writer.flush().map_err(write_err)?;
    }

    temp.persist(output).map_err(|e| write_err(e.error))?;
    Ok(total)
}

/// Whether an in-place group was already merged by an earlier pass.
///
/// With sources kept, the merged artifact reappears as ordinal 0 of its own
/// group. It counts as complete when it ends with the exact bytes of the
/// suffixed members, sizes compared first.
fn already_merged(group: &SegmentGroup) -> SegmentResult<bool> {
    let (lead, rest) = match group.members.split_first() {
        Some(((0, lead), rest)) if !rest.is_empty() => (lead, rest),
        _ => return Ok(false),
    };
    let lead = lead.as_path();
    let group_path = group.output_path();
    let unreadable = |segment: &Path, e: io::Error| SegmentError::SegmentUnreadable {
        group: group_path.clone(),
        segment: segment.to_path_buf(),
        source: e,
    };

    let lead_len = fs::metadata(lead).map_err(|e| unreadable(lead, e))?.len();
    let mut tail_len = 0u64;
    for (_, segment) in rest {
        let segment = segment.as_path();
        tail_len += fs::metadata(segment)
            .map_err(|e| unreadable(segment, e))?
            .len();
    }
    if tail_len == 0 || lead_len < tail_len {
        return Ok(false);
    }

    let mut merged = File::open(lead).map_err(|e| unreadable(lead, e))?;
    merged
        .seek(SeekFrom::Start(lead_len - tail_len))
        .map_err(|e| unreadable(lead, e))?;
    let mut expected = vec![0u8; BUFFER_SIZE];
    let mut actual = vec![0u8; BUFFER_SIZE];

    for (_, segment) in rest {
        let segment = segment.as_path();
        let mut reader = File::open(segment).map_err(|e| unreadable(segment, e))?;
        loop {
            let n = match reader.read(&mut expected) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(unreadable(segment, e)),
            };
            merged
                .read_exact(&mut actual[..n])
                .map_err(|e| unreadable(lead, e))?;
            if actual[..n] != expected[..n] {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Remove a file, waiting out transient locks. Already-missing is fine.
fn remove_member(path: &Path) -> SegmentResult<()> {
    let removed = retry_with(&RetryPolicy::locked_file(), is_transient_io, || {
        match fs::remove_file(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    });
    removed
        .into_result()
        .map_err(|source| SegmentError::DeleteFailed {
            path: path.to_path_buf(),
            source,
        })
}

/// Reassemble every segment group under `root`.
///
/// Group-level failures are collected in the report and do not stop other
/// groups; only a failed scan is an error.
pub fn reassemble(root: &Path, options: &ReassemblyOptions) -> SegmentResult<ReassemblyReport> {
    let groups = scan_groups(root)?;
    let mut report = ReassemblyReport::default();

    for group in &groups {
        let output = match &options.output_dir {
            Some(out) => out
                .join(group.dir.strip_prefix(root).unwrap_or(Path::new("")))
                .join(&group.identity),
            None => group.output_path(),
        };

        if group.is_single() {
            if options.output_dir.is_some() {
                if let Err(e) = copy_single(group, &output) {
                    warn!(error = %e, "Failed to copy file");
                    report.failures.push(e);
                } else {
                    report.copied += 1;
                }
            }
            continue;
        }

        if let Err(e) = group.validate() {
            warn!(error = %e, "Skipping inconsistent segment group");
            report.failures.push(e);
            continue;
        }

        if options.output_dir.is_none() {
            match already_merged(group) {
                Ok(true) => {
                    debug!(output = %output.display(), "Segment group already merged");
                    report.already_complete += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "Segment group check failed");
                    report.failures.push(e);
                    continue;
                }
            }
        }

        match merge_group(group, &output) {
            Ok(bytes) => {
                debug!(
                    output = %output.display(),
                    segments = group.members.len(),
                    bytes,
                    "Merged segment group"
                );
                report.merged.push(MergedFile {
                    output: output.clone(),
                    segments: group.members.len(),
                    bytes,
                });
            }
            Err(e) => {
                warn!(error = %e, "Segment group merge failed");
                report.failures.push(e);
                continue;
            }
        }

        if options.delete_sources {
            for (_, member) in &group.members {
                if *member == output {
                    continue;
                }
                if let Err(e) = remove_member(member) {
                    warn!(error = %e, "Failed to delete merged segment");
                    report.failures.push(e);
                }
            }
        }
    }

    info!(
        root = %root.display(),
        groups = groups.len(),
        merged = report.merged.len(),
        copied = report.copied,
        already_complete = report.already_complete,
        failed = report.failures.len(),
        "Reassembly finished"
    );
    Ok(report)
}

fn copy_single(group: &SegmentGroup, output: &Path) -> SegmentResult<()> {
    let source = &group.members[0].1;
    if source == output {
        return Ok(());
    }
    let write_err = |e| SegmentError::WriteFailed {
        group: group.output_path(),
        source: e,
    };
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::copy(source, output).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_merge_in_ordinal_order_with_empty_member() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "s.bin.2", "B");
        write(temp.path(), "s.bin", "A");
        write(temp.path(), "s.bin.1", "");

        let report = reassemble(temp.path(), &ReassemblyOptions::new()).unwrap();

        assert!(report.is_clean());
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.merged[0].segments, 3);
        assert_eq!(fs::read_to_string(temp.path().join("s.bin")).unwrap(), "AB");
    }

    #[test]
    fn test_dash_convention_groups_by_directory() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a/voice-001.acb", "1");
        write(temp.path(), "a/voice-002.acb", "2");
        write(temp.path(), "b/voice-001.acb", "x");
        write(temp.path(), "b/voice-002.acb", "y");

        let groups = scan_groups(temp.path()).unwrap();
        assert_eq!(groups.len(), 2);

        let report = reassemble(temp.path(), &ReassemblyOptions::new()).unwrap();
        assert_eq!(report.merged.len(), 2);
        assert_eq!(fs::read_to_string(temp.path().join("a/voice.acb")).unwrap(), "12");
        assert_eq!(fs::read_to_string(temp.path().join("b/voice.acb")).unwrap(), "xy");
    }

    #[test]
    fn test_single_file_is_left_alone() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "plain.bin", "data");

        let report = reassemble(temp.path(), &ReassemblyOptions::new()).unwrap();
        assert!(report.merged.is_empty());
        assert_eq!(report.copied, 0);
        assert_eq!(fs::read_to_string(temp.path().join("plain.bin")).unwrap(), "data");
    }

    #[test]
    fn test_output_dir_copies_singles_and_merges() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let out = temp.path().join("out");
        write(&src, "d/plain.bin", "p");
        write(&src, "d/m.bin.1", "x");
        write(&src, "d/m.bin.2", "y");

        let options = ReassemblyOptions::new().with_output_dir(&out);
        let report = reassemble(&src, &options).unwrap();

        assert_eq!(report.copied, 1);
        assert_eq!(fs::read_to_string(out.join("d/plain.bin")).unwrap(), "p");
        assert_eq!(fs::read_to_string(out.join("d/m.bin")).unwrap(), "xy");
        // Sources untouched
        assert!(src.join("d/m.bin.1").exists());
    }

    #[test]
    fn test_gap_is_integrity_error_and_other_groups_continue() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "gap.bin", "A");
        write(temp.path(), "gap.bin.2", "C");
        write(temp.path(), "ok.bin.1", "o");
        write(temp.path(), "ok.bin.2", "k");

        let report = reassemble(temp.path(), &ReassemblyOptions::new()).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0],
            SegmentError::MissingSegment { ordinal: 1, .. }
        ));
        assert_eq!(fs::read_to_string(temp.path().join("gap.bin")).unwrap(), "A");
        assert_eq!(fs::read_to_string(temp.path().join("ok.bin")).unwrap(), "ok");
    }

    #[test]
    fn test_duplicate_ordinal_is_rejected() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "d-1.bin", "a");
        write(temp.path(), "d.bin.1", "b");

        let report = reassemble(temp.path(), &ReassemblyOptions::new()).unwrap();
        assert!(matches!(
            report.failures[0],
            SegmentError::DuplicateOrdinal { ordinal: 1, .. }
        ));
        assert!(!temp.path().join("d.bin").exists());
    }

    #[test]
    fn test_unreadable_member_leaves_no_output() {
        let temp = TempDir::new().unwrap();
        let group = SegmentGroup {
            dir: temp.path().to_path_buf(),
            identity: "lost.bin".to_string(),
            members: vec![
                (1, write(temp.path(), "lost.bin.1", "A")),
                (2, temp.path().join("lost.bin.2")),
            ],
        };

        let output = group.output_path();
        let result = merge_group(&group, &output);

        assert!(matches!(result, Err(SegmentError::SegmentUnreadable { .. })));
        assert!(!output.exists());
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(MERGE_SUFFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_delete_sources_keeps_output() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "v.acb", "1");
        write(temp.path(), "v-001.acb", "2");
        write(temp.path(), "v-002.acb", "3");

        let options = ReassemblyOptions::new().with_delete_sources(true);
        let report = reassemble(temp.path(), &options).unwrap();

        assert!(report.is_clean());
        assert_eq!(fs::read_to_string(temp.path().join("v.acb")).unwrap(), "123");
        assert!(!temp.path().join("v-001.acb").exists());
        assert!(!temp.path().join("v-002.acb").exists());
    }

    #[test]
    fn test_second_pass_with_kept_sources_is_noop() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "v-001.acb", "1");
        write(temp.path(), "v-002.acb", "2");

        let first = reassemble(temp.path(), &ReassemblyOptions::new()).unwrap();
        assert_eq!(first.merged.len(), 1);
        assert_eq!(fs::read_to_string(temp.path().join("v.acb")).unwrap(), "12");

        let second = reassemble(temp.path(), &ReassemblyOptions::new()).unwrap();
        assert!(second.is_clean());
        assert!(second.merged.is_empty());
        assert_eq!(second.already_complete, 1);
        assert_eq!(fs::read_to_string(temp.path().join("v.acb")).unwrap(), "12");
    }

    #[test]
    fn test_second_pass_with_leading_member_is_noop() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "s.bin", "A");
        write(temp.path(), "s.bin.1", "B");
        write(temp.path(), "s.bin.2", "C");

        reassemble(temp.path(), &ReassemblyOptions::new()).unwrap();
        let second = reassemble(temp.path(), &ReassemblyOptions::new()).unwrap();

        assert_eq!(second.already_complete, 1);
        assert_eq!(fs::read_to_string(temp.path().join("s.bin")).unwrap(), "ABC");
    }

    #[test]
    fn test_leading_member_that_differs_is_merged() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "s.bin", "xy");
        write(temp.path(), "s.bin.1", "z");

        let report = reassemble(temp.path(), &ReassemblyOptions::new()).unwrap();

        assert_eq!(report.already_complete, 0);
        assert_eq!(fs::read_to_string(temp.path().join("s.bin")).unwrap(), "xyz");
    }
}
