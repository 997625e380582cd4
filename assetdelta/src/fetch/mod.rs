//! Resilient batch downloads.
//!
//! This module provides:
//! - Task construction with path-traversal checks (`task`)
//! - A transport seam with a reqwest implementation (`transport`)
//! - The bounded-concurrency, retrying fetcher (`fetcher`)
//! - Batch reports and the failed-id record (`state`)
//! - Atomic progress counters and a polling reporter (`progress`)
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use assetdelta::fetch::{FetchConfig, FetchTask, ReqwestTransport, ResilientFetcher};
//!
//! let tasks = FetchTask::batch(["a.bin", "b/c.bin"], "https://cdn.example.com/x", Path::new("raw"))?;
//! let fetcher = ResilientFetcher::new(ReqwestTransport::new()?, FetchConfig::new().with_concurrency(4));
//! let report = fetcher.fetch_all(&tasks)?;
//! println!("{} failed", report.failed());
//! ```

mod error;
mod fetcher;
mod progress;
mod state;
mod task;
mod transport;

pub use error::{FetchError, FetchResult};
pub use fetcher::{
    FetchConfig, ResilientFetcher, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, PARTIAL_SUFFIX,
};
pub use progress::{FetchProgress, FetchProgressCallback, ProgressCounters};
pub use state::{read_failed_record, write_failed_record, FetchReport, TaskOutcome};
pub use task::{FetchTask, TaskBatch};
pub use transport::{ReqwestTransport, Transport, TransportError, DEFAULT_TIMEOUT_SECS};

#[cfg(test)]
pub(crate) use transport::tests::{MockReply, MockTransport};
