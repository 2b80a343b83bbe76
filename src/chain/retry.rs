//! Retry context carried through `CometRpcClient::retry` so every attempt logs
//! the same method/height fields.

use super::node::ChainError;
use crate::types::Height;
use std::time::Duration;

macro_rules! log_with_retry_ctx {
    ($level:ident, $ctx:expr, $($rest:tt)*) => {{
        if let Some(height) = $ctx.height {
            tracing::$level!(method = $ctx.method, height, $($rest)*);
        } else {
            tracing::$level!(method = $ctx.method, $($rest)*);
        }
    }};
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RetryContext {
    method: &'static str,
    height: Option<Height>,
}

impl RetryContext {
    pub(crate) fn new(method: &'static str) -> Self {
        Self {
            method,
            height: None,
        }
    }

    pub(crate) fn for_height(method: &'static str, height: Height) -> Self {
        Self {
            method,
            height: Some(height),
        }
    }

    pub(crate) fn method(&self) -> &'static str {
        self.method
    }

    pub(crate) fn log_success(&self, attempt: usize) {
        log_with_retry_ctx!(trace, self, attempt, "chain node call completed");
    }

    pub(crate) fn log_retry(&self, attempt: usize, backoff: Duration, err: &ChainError) {
        let backoff_ms = backoff.as_millis().min(u128::from(u64::MAX)) as u64;
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            backoff_ms,
            error = %err,
            "chain node call failed; retrying"
        );
    }

    pub(crate) fn log_exhausted(&self, attempt: usize, err: &ChainError) {
        log_with_retry_ctx!(error, self, attempt, error = %err, "chain node call exhausted retries");
    }

    pub(crate) fn log_rejected(&self, err: &ChainError) {
        log_with_retry_ctx!(debug, self, error = %err, "chain node call failed without retry");
    }
}
