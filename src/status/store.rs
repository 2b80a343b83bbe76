use crate::types::Height;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::fmt;

pub type StatusFuture<'a, T> = BoxFuture<'a, Result<T, StatusError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStatus {
    Unprocessed,
    Processing,
    Processed,
    Errored,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProcessingStatus::Unprocessed => "unprocessed",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Errored => "errored",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub status: ProcessingStatus,
    /// Diagnostic kept for errored heights.
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusRecord {
    pub fn new(status: ProcessingStatus) -> Self {
        Self {
            status,
            message: None,
            updated_at: Utc::now(),
        }
    }

    pub fn errored(message: impl Into<String>) -> Self {
        Self {
            status: ProcessingStatus::Errored,
            message: Some(message.into()),
            updated_at: Utc::now(),
        }
    }
}

/// Result of an atomic compare-and-create on a height's status row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Created,
    Exists(StatusRecord),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StatusError {
    #[error("status store unavailable: {0}")]
    Unavailable(String),
    #[error("status store rejected update for height {height}: {reason}")]
    Rejected { height: Height, reason: String },
}

/// Storage contract for per-height processing status.
///
/// `claim_processing` and `reclaim_errored` must be atomic with respect to
/// concurrent callers; every other operation only touches the row owned by the
/// caller.
pub trait StatusStore: Send + Sync + 'static {
    fn get_status(&self, height: Height) -> StatusFuture<'_, Option<StatusRecord>>;

    /// Creates the row in `Processing` if absent.
    fn claim_processing(&self, height: Height) -> StatusFuture<'_, ClaimOutcome>;

    /// Moves an `Errored` (or never-claimed `Unprocessed`) row to `Processing`.
    /// Returns `false` when the row was in any other state.
    fn reclaim_errored(&self, height: Height) -> StatusFuture<'_, bool>;

    fn mark_processed(&self, height: Height) -> StatusFuture<'_, ()>;

    fn mark_errored<'a>(&'a self, height: Height, message: &'a str) -> StatusFuture<'a, ()>;

    /// Update time of the most recently processed height, if any.
    fn latest_processed_block(&self) -> StatusFuture<'_, Option<DateTime<Utc>>>;
}
