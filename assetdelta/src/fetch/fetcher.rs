//! Bounded-concurrency batch downloader.
//!
//! Each task runs on a fixed-size worker pool:
//!
//! ```text
//! destination exists? ── yes ──> Skipped (no request)
//!        │ no
//!        v
//! GET url ──> temp file beside destination ──> persist (no clobber)
//!        │
//!        └── transient error ──> backoff, retry (up to max attempts)
//! ```
//!
//! A task's failure never affects its siblings; the batch always returns a
//! full report and callers decide what a non-empty failure set means.

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::error::{FetchError, FetchResult};
use super::progress::{FetchProgressCallback, ProgressCounters, ProgressReporter};
use super::state::{FetchReport, TaskOutcome};
use super::task::FetchTask;
use super::transport::Transport;
use crate::retry::{retry_with, RetryPolicy, DEFAULT_INITIAL_DELAY_MS};

/// Buffer size for streaming response bodies (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Suffix of in-flight temp files.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Default number of concurrent transfers.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default attempts per task, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Fetcher configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Maximum transfers in flight.
    pub concurrency: usize,
    /// Attempts per task, including the first.
    pub max_attempts: u32,
    /// Backoff after the first failure; doubles per attempt.
    pub initial_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
        }
    }
}

impl FetchConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of concurrent transfers (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the attempts per task (minimum 1).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the initial backoff.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// The retry policy applied to each task.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_attempts, self.initial_backoff)
    }
}

/// Bytes one attempt has credited to the progress counters. They are
/// withdrawn on drop unless the attempt commits.
struct AttemptBytes<'a> {
    counters: &'a ProgressCounters,
    written: u64,
    committed: bool,
}

impl<'a> AttemptBytes<'a> {
    fn new(counters: &'a ProgressCounters) -> Self {
        Self {
            counters,
            written: 0,
            committed: false,
        }
    }

    fn add(&mut self, n: u64) {
        self.written += n;
        self.counters.add_bytes(n);
    }

    fn commit(mut self) -> u64 {
        self.committed = true;
        self.written
    }
}

impl Drop for AttemptBytes<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.counters.remove_bytes(self.written);
        }
    }
}

/// Downloads batches of objects with retry and skip-if-present semantics.
pub struct ResilientFetcher<T: Transport> {
    transport: T,
    config: FetchConfig,
    on_progress: Option<FetchProgressCallback>,
}

impl<T: Transport> ResilientFetcher<T> {
    /// Create a fetcher over `transport`.
    pub fn new(transport: T, config: FetchConfig) -> Self {
        Self {
            transport,
            config,
            on_progress: None,
        }
    }

    /// Report progress snapshots to `callback` while a batch runs.
    pub fn with_progress(mut self, callback: FetchProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run a batch to completion.
    ///
    /// Only failing to start the worker pool is an error; per-task failures
    /// are reported in the returned [`FetchReport`].
    pub fn fetch_all(&self, tasks: &[FetchTask]) -> FetchResult<FetchReport> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency)
            .thread_name(|i| format!("fetch-{}", i))
            .build()
            .map_err(|e| FetchError::PoolBuild(e.to_string()))?;

        let counters = Arc::new(ProgressCounters::new(tasks.len()));
        let outcomes = Mutex::new(Vec::with_capacity(tasks.len()));

        let _reporter = self
            .on_progress
            .as_ref()
            .map(|cb| ProgressReporter::start_default(Arc::clone(&counters), Arc::clone(cb)));

        info!(
            tasks = tasks.len(),
            concurrency = self.config.concurrency,
            max_attempts = self.config.max_attempts,
            "Starting fetch batch"
        );

        pool.install(|| {
            tasks.par_iter().for_each(|task| {
                let outcome = self.run_task(task, &counters);
                outcomes.lock().push((task.object_id.clone(), outcome));
            });
        });

        let report = FetchReport::new(outcomes.into_inner());
        info!(
            downloaded = report.downloaded(),
            skipped = report.skipped(),
            failed = report.failed(),
            bytes = report.bytes(),
            "Fetch batch finished"
        );
        Ok(report)
    }

    /// Run a single task outside of a batch.
    pub fn fetch_one(&self, task: &FetchTask) -> TaskOutcome {
        self.run_task(task, &ProgressCounters::new(1))
    }

    fn run_task(&self, task: &FetchTask, counters: &ProgressCounters) -> TaskOutcome {
        if task.destination.exists() {
            debug!(id = %task.object_id, "Destination present, skipping");
            counters.mark_finished(false);
            return TaskOutcome::Skipped;
        }

        let retried = retry_with(
            &self.config.retry_policy(),
            FetchError::is_retryable,
            || self.download(task, counters),
        );

        let outcome = match retried.result {
            Ok(bytes) => {
                debug!(
                    id = %task.object_id,
                    bytes,
                    attempts = retried.attempts,
                    "Downloaded object"
                );
                TaskOutcome::Downloaded {
                    bytes,
                    attempts: retried.attempts,
                }
            }
            Err(e) => {
                warn!(
                    id = %task.object_id,
                    attempts = retried.attempts,
                    error = %e,
                    "Giving up on object"
                );
                TaskOutcome::Failed {
                    reason: e.to_string(),
                    attempts: retried.attempts,
                }
            }
        };

        counters.mark_finished(outcome.is_failure());
        outcome
    }

    /// One attempt: stream the body into a temp file and move it into place.
    fn download(&self, task: &FetchTask, counters: &ProgressCounters) -> FetchResult<u64> {
        let dest = &task.destination;
        let parent = dest.parent().ok_or_else(|| FetchError::InvalidObjectId {
            id: task.object_id.clone(),
            reason: "destination has no parent directory".to_string(),
        })?;

        let mut body = self
            .transport
            .open(&task.url)
            .map_err(|source| FetchError::Transport {
                url: task.url.clone(),
                source,
            })?;

        fs::create_dir_all(parent).map_err(|e| FetchError::CreateDirFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;

        let mut temp = tempfile::Builder::new()
            .prefix(".")
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(parent)
            .map_err(|e| FetchError::WriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;

        let write_err = |e| FetchError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        };

        let mut written = AttemptBytes::new(counters);
        {
            let mut writer = BufWriter::with_capacity(BUFFER_SIZE, temp.as_file_mut());
            let mut buffer = vec![0u8; BUFFER_SIZE];

            loop {
                let bytes_read = match body.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        return Err(FetchError::BodyRead {
                            url: task.url.clone(),
                            source: e,
                        })
                    }
                };

                writer.write_all(&buffer[..bytes_read]).map_err(write_err)?;
                written.add(bytes_read as u64);
            }

            writer.flush().map_err(write_err)?;
        }

        match temp.persist_noclobber(dest) {
            Ok(_) => Ok(written.commit()),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                // A concurrent task for the same id finished first.
                debug!(id = %task.object_id, "Destination appeared during download");
                Ok(written.commit())
            }
            Err(e) => Err(write_err(e.error)),
        }
    }
}
