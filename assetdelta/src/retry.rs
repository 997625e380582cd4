//! Retry policies and the classified-error retry loop.
//!
//! Every operation that may hit a transient failure (HTTP transfers, reads of
//! briefly locked files, deletes) goes through [`retry_with`]. The caller
//! supplies a predicate that separates retryable failures from terminal ones,
//! so a 404 is never retried while a timeout is.
//!
//! # Example
//!
//! ```ignore
//! use assetdelta::retry::{retry_with, RetryPolicy};
//!
//! let policy = RetryPolicy::exponential(4, Duration::from_millis(500));
//! let outcome = retry_with(&policy, |e: &io::Error| is_transient_io(e), || {
//!     std::fs::read(&path)
//! });
//! ```

use std::io;
use std::thread;
use std::time::Duration;

use tracing::debug;

// =============================================================================
// Retry Policy Constants
// =============================================================================

/// Default initial delay for exponential backoff (500ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;

/// Default maximum delay for exponential backoff (30 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Attempts used for reads and deletes of transiently locked files.
pub const LOCKED_FILE_ATTEMPTS: u32 = 5;

/// Fixed delay between attempts on a transiently locked file.
pub const LOCKED_FILE_DELAY_MS: u64 = 200;

/// How an operation handles transient failures.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// No retries - fail immediately on error.
    None,

    /// Fixed number of attempts with constant delay between them.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },

    /// Exponential backoff.
    ///
    /// The delay is multiplied after each failed attempt, up to `max_delay`.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay after the first failure.
        initial_delay: Duration,
        /// Delay cap.
        max_delay: Duration,
        /// Multiplier applied to the delay after each failure.
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::None
    }
}

impl RetryPolicy {
    /// Creates a doubling backoff policy starting at `initial_delay`.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum number of attempts (including initial)
    /// * `initial_delay` - Delay before the first retry
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        Self::ExponentialBackoff {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Creates a fixed retry policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Policy for reads and deletes racing an exclusive handle held elsewhere.
    pub fn locked_file() -> Self {
        Self::fixed(
            LOCKED_FILE_ATTEMPTS,
            Duration::from_millis(LOCKED_FILE_DELAY_MS),
        )
    }

    /// Calculates the delay before retrying after `attempt` failed attempts.
    ///
    /// `attempt` is 1-based: 1 means the initial attempt just failed.
    /// Returns `None` when no more attempts are allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => (attempt < *max_attempts).then_some(*delay),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay_ms = initial_delay.as_millis() as f64 * factor;
                let capped = delay_ms.min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(capped as u64))
            }
        }
    }

    /// Returns the maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => *max_attempts,
            Self::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }
}

/// Final result of a retried operation.
#[derive(Debug)]
pub struct Retried<T, E> {
    /// The last outcome.
    pub result: Result<T, E>,
    /// Number of attempts made (at least 1).
    pub attempts: u32,
}

impl<T, E> Retried<T, E> {
    /// Discards the attempt count.
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Runs `op` until it succeeds, fails terminally, or the policy is exhausted.
///
/// `is_retryable` classifies each error. A terminal error ends the loop
/// immediately, regardless of remaining attempts.
pub fn retry_with<T, E, F, P>(policy: &RetryPolicy, is_retryable: P, mut op: F) -> Retried<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => {
                return Retried {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) => {
                let delay = if is_retryable(&e) {
                    policy.delay_for_attempt(attempt)
                } else {
                    None
                };
                match delay {
                    Some(delay) => {
                        debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying");
                        thread::sleep(delay);
                        attempt += 1;
                    }
                    None => {
                        return Retried {
                            result: Err(e),
                            attempts: attempt,
                        }
                    }
                }
            }
        }
    }
}

/// Whether an I/O error looks like a file briefly held open elsewhere.
///
/// Covers the portable kinds plus the Windows sharing/lock violations
/// (raw codes 32 and 33), which surface as generic errors.
pub fn is_transient_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
    ) || (cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_retry_policy_none() {
        let policy = RetryPolicy::None;
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delay_for_attempt(1), None);
    }

    #[test]
    fn test_retry_policy_fixed() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(100));
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_attempt(3), None);
    }

    #[test]
    fn test_retry_policy_exponential_doubles() {
        let policy = RetryPolicy::exponential(4, Duration::from_millis(100));

        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for_attempt(4), None);
    }

    #[test]
    fn test_retry_policy_exponential_respects_max_delay() {
        let policy = RetryPolicy::ExponentialBackoff {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(8), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_exponential_min_one_attempt() {
        let policy = RetryPolicy::exponential(0, Duration::from_millis(1));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_retry_with_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::fixed(5, Duration::ZERO);

        let outcome = retry_with(
            &policy,
            |_: &&str| true,
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err("busy")
                } else {
                    Ok(42)
                }
            },
        );

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result, Ok(42));
    }

    #[test]
    fn test_retry_with_stops_on_terminal_error() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::fixed(5, Duration::ZERO);

        let outcome: Retried<(), &str> = retry_with(
            &policy,
            |e: &&str| *e != "gone",
            || {
                calls.set(calls.get() + 1);
                Err("gone")
            },
        );

        assert_eq!(calls.get(), 1);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.result.is_err());
    }

    #[test]
    fn test_retry_with_exhausts_attempts() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let outcome: Retried<(), &str> = retry_with(
            &policy,
            |_| true,
            || {
                calls.set(calls.get() + 1);
                Err("timeout")
            },
        );

        assert_eq!(calls.get(), 3);
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_is_transient_io() {
        assert!(is_transient_io(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
        assert!(!is_transient_io(&io::Error::from(io::ErrorKind::NotFound)));
    }
}
