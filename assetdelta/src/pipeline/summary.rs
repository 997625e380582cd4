//! Per-stage summaries.

use std::path::PathBuf;

use crate::external::ExternalError;
use crate::fetch::FetchReport;
use crate::manifest::DiffResult;
use crate::reconcile::ReconcileReport;
use crate::segment::ReassemblyReport;
use crate::version::ReleaseVersion;

use super::layout::Category;

/// Outcome of fetching one release manifest.
#[derive(Debug, Clone)]
pub struct ManifestSummary {
    pub version: ReleaseVersion,
    pub path: PathBuf,
    /// Entries parsed from the snapshot.
    pub entries: usize,
    /// False when an existing snapshot was reused.
    pub fetched: bool,
}

/// Outcome of diffing two manifests.
#[derive(Debug, Clone)]
pub struct DiffSummary {
    pub diff: DiffResult,
    pub record: PathBuf,
}

/// Outcome of downloading a delta.
#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    /// Added and changed objects fetched from the new release.
    pub from_new: FetchReport,
    /// Previous content of changed objects fetched from the old release.
    pub from_old: FetchReport,
    /// Failed-id records written for this run.
    pub failed_records: Vec<PathBuf>,
}

impl DownloadSummary {
    pub fn total(&self) -> usize {
        self.from_new.total() + self.from_old.total()
    }

    pub fn downloaded(&self) -> usize {
        self.from_new.downloaded() + self.from_old.downloaded()
    }

    pub fn skipped(&self) -> usize {
        self.from_new.skipped() + self.from_old.skipped()
    }

    pub fn failed(&self) -> usize {
        self.from_new.failed() + self.from_old.failed()
    }

    pub fn bytes(&self) -> u64 {
        self.from_new.bytes() + self.from_old.bytes()
    }

    pub fn is_complete(&self) -> bool {
        self.from_new.is_complete() && self.from_old.is_complete()
    }
}

/// Outcome of the extraction stage.
#[derive(Debug, Default)]
pub struct ExtractSummary {
    /// Categories extracted and the number of files each produced.
    pub extracted: Vec<(Category, usize)>,
    pub failures: Vec<(Category, ExternalError)>,
}

/// Outcome of reassembly over every extracted category.
#[derive(Debug, Default)]
pub struct ReassembleSummary {
    pub reports: Vec<(Category, ReassemblyReport)>,
}

impl ReassembleSummary {
    pub fn merged(&self) -> usize {
        self.reports.iter().map(|(_, r)| r.merged.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().map(|(_, r)| r.failures.len()).sum()
    }

    /// Groups left alone because an earlier pass merged them.
    pub fn already_complete(&self) -> usize {
        self.reports.iter().map(|(_, r)| r.already_complete).sum()
    }
}

/// A file the decode stage could not process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of the decode stage.
#[derive(Debug, Clone, Default)]
pub struct DecodeSummary {
    /// Containers unpacked.
    pub unpacked: usize,
    /// Streams decoded.
    pub decoded: usize,
    pub failures: Vec<DecodeFailure>,
}

impl DecodeSummary {
    pub(crate) fn absorb(&mut self, other: DecodeSummary) {
        self.unpacked += other.unpacked;
        self.decoded += other.decoded;
        self.failures.extend(other.failures);
    }
}

/// Outcome of flattening the output trees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlattenSummary {
    /// Directories collapsed.
    pub collapsed: usize,
    /// Files left in the output trees.
    pub files: usize,
}

/// Everything `run` did.
#[derive(Debug)]
pub struct RunSummary {
    pub manifests: Vec<ManifestSummary>,
    pub diff: DiffSummary,
    pub download: DownloadSummary,
    pub extract: ExtractSummary,
    pub reassemble: ReassembleSummary,
    /// Absent when no decoder is configured.
    pub decode: Option<DecodeSummary>,
    pub reconcile: ReconcileReport,
    pub flatten: FlattenSummary,
}
