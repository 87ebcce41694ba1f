//! Outbound HTTP calls with timeout, bounded retry and one-shot failover
//!
//! [`UpstreamClient`] never raises ordinary HTTP failures. Every call ends in a
//! [`CallOutcome`]: the body, a distinct rate-limit signal, or the last error
//! after the retry budget ran out. Only requests that cannot be built at all
//! come back as a [`RequestError`].

mod client;
#[cfg(test)]
pub(crate) mod fake;
mod transport;

pub use client::UpstreamClient;
pub use transport::{PreparedRequest, RawResponse, ReqwestTransport, Transport, TransportError};

use reqwest::Method;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default delay before the first retry
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Default growth factor between retry delays
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.5;

/// A retryable failure of a single upstream attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// The attempt exceeded its deadline and was aborted
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    /// The upstream answered with a non-2xx, non-429 status
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// The body did not have the expected shape
    #[error("malformed upstream payload: {0}")]
    Malformed(String),
}

/// A request that cannot be sent at all
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid upstream URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid request: {0}")]
    Invalid(String),

    /// A caller-supplied value that cannot be placed in an upstream URL
    #[error("invalid {name} '{value}'")]
    InvalidParam { name: &'static str, value: String },
}

/// Result of an upstream call
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Success(T),
    /// HTTP 429; the same endpoint was not tried again
    RateLimited,
    /// Retries exhausted; carries the last attempt's error
    Failed(UpstreamError),
}

impl<T> CallOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            CallOutcome::Success(v) => CallOutcome::Success(f(v)),
            CallOutcome::RateLimited => CallOutcome::RateLimited,
            CallOutcome::Failed(e) => CallOutcome::Failed(e),
        }
    }

    /// Applies a fallible shaping step; its error turns the outcome into `Failed`
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Result<U, UpstreamError>) -> CallOutcome<U> {
        match self {
            CallOutcome::Success(v) => match f(v) {
                Ok(u) => CallOutcome::Success(u),
                Err(e) => CallOutcome::Failed(e),
            },
            CallOutcome::RateLimited => CallOutcome::RateLimited,
            CallOutcome::Failed(e) => CallOutcome::Failed(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            CallOutcome::Success(v) => Some(v),
            _ => None,
        }
    }
}

impl CallOutcome<Vec<u8>> {
    /// Decodes a successful body as JSON
    pub fn json<T: DeserializeOwned>(self) -> CallOutcome<T> {
        self.and_then(|body| {
            serde_json::from_slice(&body).map_err(|e| UpstreamError::Malformed(e.to_string()))
        })
    }
}

/// One upstream host and the credential headers sent to it
#[derive(Clone, PartialEq, Eq)]
pub struct Target {
    pub base_url: String,
    pub headers: Vec<(String, String)>,
}

impl Target {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

// Header values are credentials; keep them out of logs.
impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("Target")
            .field("base_url", &self.base_url)
            .field("headers", &names)
            .finish()
    }
}

/// Where and how persistently to call an upstream API
#[derive(Debug, Clone)]
pub struct UpstreamEndpoint {
    pub primary: Target,
    /// Backup host/credentials used after the first failure
    pub secondary: Option<Target>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
}

impl UpstreamEndpoint {
    pub fn new(primary: Target) -> Self {
        Self {
            primary,
            secondary: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    pub fn with_secondary(mut self, secondary: Target) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Sets the backoff growth factor; values below 1.0 are clamped to 1.0
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        self
    }

    /// Delay slept before retry number `attempt + 1`
    pub fn retry_delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let millis = self.retry_delay.as_millis() as f64 * factor;
        if millis.is_finite() && millis < u64::MAX as f64 {
            Duration::from_millis(millis.round() as u64)
        } else {
            Duration::from_millis(u64::MAX)
        }
    }
}

/// A single logical call against an [`UpstreamEndpoint`]
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path appended to the target's base URL
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Overrides the endpoint timeout for this call class
    pub timeout: Option<Duration>,
}

impl UpstreamRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        let mut req = Self::new(Method::POST, path);
        req.body = Some(body);
        req
    }

    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
