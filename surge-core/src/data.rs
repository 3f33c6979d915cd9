use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Why a request produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErrorKind {
    Timeout,
    Connect,
    Other,
}

impl fmt::Display for RequestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestErrorKind::Timeout => f.write_str("timeout"),
            RequestErrorKind::Connect => f.write_str("connect"),
            RequestErrorKind::Other => f.write_str("other"),
        }
    }
}

/// Outcome of a single HTTP request. Immutable once recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResult {
    pub timestamp: SystemTime,
    pub url: Arc<str>,
    pub group: Option<Arc<str>>,
    pub duration: Duration,
    /// `None` when no response was received.
    pub status: Option<u16>,
    /// Set for network errors and for statuses outside the expected set.
    pub failed: bool,
    pub error: Option<RequestErrorKind>,
}

/// One evaluation of a named check inside a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: Arc<str>,
    pub group: Option<Arc<str>>,
    pub passed: bool,
}

/// One complete scenario iteration run by a virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationResult {
    pub duration: Duration,
    /// The iteration panicked.
    pub failed: bool,
}

/// Anything a virtual user reports to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Request(RequestResult),
    Check(CheckResult),
    Iteration(IterationResult),
}
