//! Unified error types for the ingestion pipeline.
//!
//! The taxonomy matters more than the messages: the retry executor
//! keys off `retryable()`, and the coordinator chooses between
//! skip-for-now and store-partial off the service-specific variants.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the ingestion pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Index service (summary/history) could not be reached after
    /// retries. The coordinator treats this as "skip for now".
    #[error("index service unavailable: {0}")]
    IndexUnavailable(String),

    /// Detail service could not be reached after retries. The
    /// coordinator stores a partial record and enriches later.
    #[error("detail service unavailable: {0}")]
    DetailUnavailable(String),

    /// Upstream responded with a non-success HTTP status.
    #[error("upstream returned {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    /// Connection-level failure (reset, refused, DNS).
    #[error("transport error: {0}")]
    Transport(String),

    /// An attempt exceeded its timeout budget.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Circuit breaker is open for the named service; the wrapped
    /// operation was never invoked.
    #[error("circuit breaker open for {service}")]
    BreakerOpen { service: &'static str },

    /// Upstream payload failed to decode or violated the contract.
    #[error("invalid upstream payload: {0}")]
    InvalidPayload(String),

    /// Durable write failed. Retryable within the write step; an
    /// exhausted write aborts the current item with state unchanged.
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn upstream_status(status: u16, message: impl Into<String>) -> Self {
        Self::UpstreamStatus {
            status,
            message: message.into(),
        }
    }

    /// Whether the retry executor should spend another attempt on
    /// this failure. Rate limits, server-side unavailability, and
    /// transport-level faults are retryable; client errors and
    /// decode failures are terminal.
    pub fn retryable(&self) -> bool {
        match self {
            Self::UpstreamStatus { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            Self::Transport(_) | Self::Timeout(_) | Self::Persistence(_) => true,
            _ => false,
        }
    }

    /// 404/403 from a history page: the upstream is telling us the
    /// character has nothing (more) for us, not that it is down.
    pub fn is_client_rejection(&self) -> bool {
        matches!(self, Self::UpstreamStatus { status: 403 | 404, .. })
    }
}
