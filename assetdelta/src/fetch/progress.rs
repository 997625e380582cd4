//! Progress reporting for batch fetches.
//!
//! Workers bump shared atomic counters; an optional reporter thread polls
//! them and hands snapshots to a callback.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default reporter poll interval.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Point-in-time view of a running batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchProgress {
    /// Tasks in the batch.
    pub total: usize,
    /// Tasks that reached a final state.
    pub finished: usize,
    /// Tasks that failed terminally.
    pub failed: usize,
    /// Body bytes written so far.
    pub bytes: u64,
}

/// Callback receiving progress snapshots.
pub type FetchProgressCallback = Arc<dyn Fn(FetchProgress) + Send + Sync>;

/// Shared counters updated by fetch workers.
#[derive(Debug)]
pub struct ProgressCounters {
    total: usize,
    finished: AtomicUsize,
    failed: AtomicUsize,
    bytes: AtomicU64,
    done: AtomicBool,
}

impl ProgressCounters {
    /// Counters for a batch of `total` tasks.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            finished: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
            done: AtomicBool::new(false),
        }
    }

    /// Record body bytes written.
    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    /// Withdraw bytes from an attempt that did not commit.
    pub fn remove_bytes(&self, n: u64) {
        self.bytes.fetch_sub(n, Ordering::Relaxed);
    }

    /// Record a task reaching a final state.
    pub fn mark_finished(&self, failed: bool) {
        if failed {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> FetchProgress {
        FetchProgress {
            total: self.total,
            finished: self.finished.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// Signal that the batch is over.
    pub fn signal_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    /// Whether the batch is over.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Background thread forwarding counter snapshots to a callback.
///
/// Dropping the reporter stops it after one final report.
pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    counters: Arc<ProgressCounters>,
}

impl ProgressReporter {
    /// Start polling `counters` every `poll_interval`.
    pub fn start(
        counters: Arc<ProgressCounters>,
        callback: FetchProgressCallback,
        poll_interval: Duration,
    ) -> Self {
        let polled = Arc::clone(&counters);
        let handle = thread::spawn(move || {
            while !polled.is_done() {
                callback(polled.snapshot());
                thread::sleep(poll_interval);
            }
            callback(polled.snapshot());
        });

        Self {
            handle: Some(handle),
            counters,
        }
    }

    /// Start with the default poll interval.
    pub fn start_default(counters: Arc<ProgressCounters>, callback: FetchProgressCallback) -> Self {
        Self::start(counters, callback, DEFAULT_POLL_INTERVAL)
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.counters.signal_done();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_counters_snapshot() {
        let counters = ProgressCounters::new(3);
        counters.add_bytes(100);
        counters.add_bytes(20);
        counters.mark_finished(false);
        counters.mark_finished(true);

        let snap = counters.snapshot();
        assert_eq!(snap.total, 3);
        assert_eq!(snap.finished, 2);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.bytes, 120);
    }

    #[test]
    fn test_reporter_delivers_final_snapshot_on_drop() {
        let counters = Arc::new(ProgressCounters::new(1));
        let last = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last);
        let callback: FetchProgressCallback = Arc::new(move |p: FetchProgress| {
            *sink.lock() = Some(p);
        });

        let reporter =
            ProgressReporter::start(Arc::clone(&counters), callback, Duration::from_millis(5));
        counters.add_bytes(42);
        counters.mark_finished(false);
        drop(reporter);

        let last = (*last.lock()).unwrap();
        assert_eq!(last.finished, 1);
        assert_eq!(last.bytes, 42);
        assert!(counters.is_done());
    }
}
