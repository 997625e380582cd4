//! Per-task outcomes, batch reports and the failed-id record.

use std::fs;
use std::io;
use std::path::Path;

use super::error::{FetchError, FetchResult};

/// Final state of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Downloaded and finalized.
    Downloaded { bytes: u64, attempts: u32 },
    /// The destination already existed; nothing was requested.
    Skipped,
    /// Gave up after `attempts` tries.
    Failed { reason: String, attempts: u32 },
}

impl TaskOutcome {
    /// Whether the task ended without its object on disk.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Outcomes of a batch, sorted by object id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    outcomes: Vec<(String, TaskOutcome)>,
}

impl FetchReport {
    /// Build a report; outcomes are sorted by object id.
    pub fn new(mut outcomes: Vec<(String, TaskOutcome)>) -> Self {
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        Self { outcomes }
    }

    /// Add outcomes produced outside the fetcher, keeping id order.
    pub fn with_outcomes(mut self, extra: Vec<(String, TaskOutcome)>) -> Self {
        if extra.is_empty() {
            return self;
        }
        self.outcomes.extend(extra);
        self.outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }

    /// All outcomes in object id order.
    pub fn outcomes(&self) -> &[(String, TaskOutcome)] {
        &self.outcomes
    }

    /// Outcome for one object id.
    pub fn outcome(&self, object_id: &str) -> Option<&TaskOutcome> {
        self.outcomes
            .binary_search_by(|(id, _)| id.as_str().cmp(object_id))
            .ok()
            .map(|i| &self.outcomes[i].1)
    }

    /// Ids that failed terminally, sorted.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_failure())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Number of tasks downloaded in this batch.
    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Downloaded { .. }))
    }

    /// Number of tasks skipped because their destination existed.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Skipped))
    }

    /// Number of terminal failures.
    pub fn failed(&self) -> usize {
        self.count(TaskOutcome::is_failure)
    }

    /// Total body bytes written.
    pub fn bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|(_, o)| match o {
                TaskOutcome::Downloaded { bytes, .. } => *bytes,
                _ => 0,
            })
            .sum()
    }

    /// Number of tasks in the batch.
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether every task ended with its object on disk.
    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Write failed ids, one per line. An empty list removes the record.
pub fn write_failed_record(path: &Path, ids: &[&str]) -> FetchResult<()> {
    if ids.is_empty() {
        return match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FetchError::WriteFailed {
                path: path.to_path_buf(),
                source,
            }),
        };
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| FetchError::CreateDirFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut text = ids.join("\n");
    text.push('\n');
    fs::write(path, text).map_err(|e| FetchError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read a failed-id record. A missing record means nothing failed.
pub fn read_failed_record(path: &Path) -> FetchResult<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(FetchError::ReadFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}
