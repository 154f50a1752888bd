// Backend telemetry adapter: trait seam plus the error translation boundary.

mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::Snapshot;

/// Error codes that mean "rate limited", compared case-insensitively.
const RATE_LIMIT_CODES: &[&str] = &["rate_limited", "rate_limit_exceeded", "too_many_requests"];
/// Message fragments that mean "rate limited", compared lowercase.
const RATE_LIMIT_PHRASES: &[&str] = &["rate limit", "rate-limit", "too many requests"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("backend returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,
}

impl BackendError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BackendError::RateLimited { .. })
    }
}

/// Maps a failed call's status, error code and message to a [`BackendError`].
/// The only place that sniffs for a rate-limit signal.
pub fn classify(status: Option<u16>, code: Option<&str>, message: &str) -> BackendError {
    let code_says = code.is_some_and(|c| {
        RATE_LIMIT_CODES
            .iter()
            .any(|known| c.eq_ignore_ascii_case(known))
    });
    let lower = message.to_lowercase();
    let message_says = RATE_LIMIT_PHRASES.iter().any(|p| lower.contains(p));
    if status == Some(429) || code_says || message_says {
        return BackendError::RateLimited {
            message: message.to_string(),
        };
    }
    match status {
        Some(status) => BackendError::Http {
            status,
            message: message.to_string(),
        },
        None => BackendError::Transport(message.to_string()),
    }
}

/// Source of snapshots. Implementations should stop work when `cancel` fires.
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    async fn fetch_snapshot(&self, cancel: &CancellationToken) -> Result<Snapshot, BackendError>;

    /// Clears server-side accumulated samples.
    async fn reset_snapshot(&self) -> Result<(), BackendError>;
}
