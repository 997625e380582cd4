//! Transport abstraction for remote object retrieval.
//!
//! The fetcher only needs "open this URL as a byte stream" plus a
//! classification of what went wrong, so the seam is a small trait with a
//! reqwest-backed implementation for production use.

use std::io::Read;
use std::time::Duration;

use thiserror::Error;

use super::error::{FetchError, FetchResult};

/// Default timeout for a single request in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Classified transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// The request did not complete within the timeout.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established or was dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other request failure.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether the failure is transient.
    ///
    /// 403, 404 and 410 mean the object is not (or no longer) available and
    /// are terminal, as is any other 4xx. 408, 429 and 5xx are retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status(code) => matches!(code, 408 | 429 | 500..=599),
            Self::Timeout | Self::Connection(_) => true,
            Self::Other(_) => false,
        }
    }
}

/// Source of remote byte streams.
pub trait Transport: Send + Sync {
    /// Issue a GET for `url` and return the response body as a reader.
    ///
    /// Non-success statuses are reported as [`TransportError::Status`].
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, TransportError>;
}

/// Blocking reqwest client implementing [`Transport`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> FetchResult<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transport with a per-request timeout.
    pub fn with_timeout(timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Transport for ReqwestTransport {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, TransportError> {
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else if e.is_connect() || e.is_request() {
                TransportError::Connection(e.to_string())
            } else {
                TransportError::Other(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(Box::new(response))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::io::{self, Cursor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One scripted reply from [`MockTransport`].
    #[derive(Debug, Clone)]
    pub enum MockReply {
        Body(Vec<u8>),
        Fail(TransportError),
        /// Emit the bytes, then fail mid-stream.
        Truncated(Vec<u8>),
    }

    /// In-memory transport replaying scripted replies per URL.
    ///
    /// Each URL holds a queue; the last reply repeats once the queue drains.
    /// Unknown URLs answer 404.
    #[derive(Default)]
    pub struct MockTransport {
        replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
        requests: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, url: &str, reply: MockReply) -> Self {
            self.replies
                .lock()
                .entry(url.to_string())
                .or_default()
                .push_back(reply);
            self
        }

        pub fn requests_for(&self, url: &str) -> usize {
            self.requests.lock().get(url).copied().unwrap_or(0)
        }

        pub fn total_requests(&self) -> usize {
            self.total.load(Ordering::SeqCst)
        }
    }

    struct FailingTail {
        head: Cursor<Vec<u8>>,
    }

    impl Read for FailingTail {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.head.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
                n => Ok(n),
            }
        }
    }

    impl Transport for MockTransport {
        fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, TransportError> {
            self.total.fetch_add(1, Ordering::SeqCst);
            *self.requests.lock().entry(url.to_string()).or_default() += 1;

            let reply = {
                let mut replies = self.replies.lock();
                match replies.get_mut(url) {
                    Some(queue) if queue.len() > 1 => queue.pop_front(),
                    Some(queue) => queue.front().cloned(),
                    None => None,
                }
            };

            match reply {
                Some(MockReply::Body(bytes)) => Ok(Box::new(Cursor::new(bytes))),
                Some(MockReply::Truncated(bytes)) => Ok(Box::new(FailingTail {
                    head: Cursor::new(bytes),
                })),
                Some(MockReply::Fail(err)) => Err(err),
                None => Err(TransportError::Status(404)),
            }
        }
    }

    #[test]
    fn test_status_classification() {
        for code in [403, 404, 410, 400] {
            assert!(!TransportError::Status(code).is_retryable(), "{}", code);
        }
        for code in [500, 502, 503, 504, 429, 408] {
            assert!(TransportError::Status(code).is_retryable(), "{}", code);
        }
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Connection("reset".into()).is_retryable());
    }

    #[test]
    fn test_mock_replays_queue_then_repeats_last() {
        let mock = MockTransport::new()
            .reply("u", MockReply::Fail(TransportError::Timeout))
            .reply("u", MockReply::Body(b"ok".to_vec()));

        assert!(mock.open("u").is_err());
        let mut body = String::new();
        mock.open("u").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "ok");
        assert!(mock.open("u").is_ok());
        assert_eq!(mock.requests_for("u"), 3);
    }

    #[test]
    fn test_mock_unknown_url_is_not_found() {
        let mock = MockTransport::new();
        assert_eq!(mock.open("x").err(), Some(TransportError::Status(404)));
    }

    #[test]
    fn test_reqwest_transport_timeout() {
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(7)).unwrap();
        assert_eq!(transport.timeout(), Duration::from_secs(7));
    }
}
