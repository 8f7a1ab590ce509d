use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the klinesync workspace.
///
/// Remote failures (`Remote`, `RateLimited`) are the only retryable variants;
/// everything else is surfaced to the caller as-is.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SyncError {
    /// A remote service (candle API or dataset store) returned a transient failure.
    #[error("{service} failed: {msg}")]
    Remote {
        /// Service name, e.g. "binance" or "hub".
        service: String,
        /// Human-readable error message.
        msg: String,
    },

    /// A remote service rejected the call because of its rate limit.
    #[error("{service} rate limited (retry_after_ms={retry_after_ms:?})")]
    RateLimited {
        /// Service name that signalled the limit.
        service: String,
        /// Server-suggested wait before the next call, when provided.
        retry_after_ms: Option<u64>,
    },

    /// A fetch produced zero usable rows.
    #[error("no data available: {what}")]
    NoData {
        /// Description of what was requested, e.g. "BTCUSDT 15m".
        what: String,
    },

    /// A series failed shape or ordering checks and must not be uploaded.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Issues with a returned payload or artifact (malformed rows, codec failures).
    #[error("data issue: {0}")]
    Data(String),

    /// Pushing an artifact to the dataset store failed; the local copy is kept.
    #[error("upload of {path} failed: {msg}")]
    Upload {
        /// Dataset path that was being written.
        path: String,
        /// Underlying failure description.
        msg: String,
    },

    /// A resource could not be found.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource.
        what: String,
    },

    /// Local filesystem failure.
    #[error("io error: {0}")]
    Io(String),

    /// Invalid input argument or configuration.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Helper: build a `Remote` error with the service name and message.
    pub fn remote(service: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Remote {
            service: service.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `RateLimited` error.
    pub fn rate_limited(service: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        Self::RateLimited {
            service: service.into(),
            retry_after_ms,
        }
    }

    /// Helper: build a `NoData` error.
    pub fn no_data(what: impl Into<String>) -> Self {
        Self::NoData { what: what.into() }
    }

    /// Helper: build an `Upload` error.
    pub fn upload(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Upload {
            path: path.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Helper: wrap a local I/O failure.
    #[must_use]
    pub fn io(err: &std::io::Error) -> Self {
        Self::Io(err.to_string())
    }

    /// Returns true when a retry policy may attempt the call again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::RateLimited { .. })
    }

    /// Returns true for rate-limit rejections, which get a longer backoff.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Server-suggested wait for rate-limit rejections.
    #[must_use]
    pub const fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::io(&err)
    }
}
