use std::fmt;
use std::sync::Arc;

use archiver_core::Timestamp;

/// Wall-clock source for access timestamps, injectable for tests.
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub status_code: u16,
    pub content_type: Option<String>,
    /// Present only when the content type is archived by policy.
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    Timeout,
    RedirectLimitExceeded,
    Connect,
    Body,
    Network,
}

impl FailureKind {
    /// Name stored as `error_type` in the per-run link log.
    pub fn name(self) -> &'static str {
        match self {
            FailureKind::InvalidUrl => "InvalidUrl",
            FailureKind::Timeout => "Timeout",
            FailureKind::RedirectLimitExceeded => "RedirectLimitExceeded",
            FailureKind::Connect => "Connect",
            FailureKind::Body => "Body",
            FailureKind::Network => "Network",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::Connect => write!(f, "connection failed"),
            FailureKind::Body => write!(f, "body read failed"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}
