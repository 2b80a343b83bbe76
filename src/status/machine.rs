//! Claim/finalize protocol gating every height.
//!
//! Transitions: Unprocessed -> Processing -> {Processed | Errored}. An errored
//! height only returns to Processing when `reprocess_errored` is configured.
//! Store failures never block ingestion: a failed claim still processes the
//! height without a status row, and a failed finalize is logged.

use super::store::{ClaimOutcome, ProcessingStatus, StatusStore};
use crate::types::Height;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    Proceed,
    SkipProcessed,
    /// Held by another worker, or left behind by an interrupted run.
    SkipProcessing,
    SkipErrored,
    /// The store could not be reached. The height is processed anyway and may be
    /// processed again after a restart.
    ProceedUnrecorded,
}

impl ClaimDecision {
    pub fn should_process(self) -> bool {
        matches!(self, ClaimDecision::Proceed | ClaimDecision::ProceedUnrecorded)
    }
}

#[derive(Clone)]
pub struct BlockStateMachine {
    store: Arc<dyn StatusStore>,
    reprocess_errored: bool,
}

impl BlockStateMachine {
    pub fn new(store: Arc<dyn StatusStore>, reprocess_errored: bool) -> Self {
        Self {
            store,
            reprocess_errored,
        }
    }

    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    pub fn reprocess_errored(&self) -> bool {
        self.reprocess_errored
    }

    pub async fn claim(&self, height: Height) -> ClaimDecision {
        let outcome = match self.store.claim_processing(height).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(height, error = %err, "failed to claim height; processing without status");
                return ClaimDecision::ProceedUnrecorded;
            }
        };

        let existing = match outcome {
            ClaimOutcome::Created => return ClaimDecision::Proceed,
            ClaimOutcome::Exists(record) => record.status,
        };

        match existing {
            ProcessingStatus::Processed => {
                tracing::debug!(height, "block already processed. skip height");
                ClaimDecision::SkipProcessed
            }
            ProcessingStatus::Processing => {
                tracing::debug!(height, "block is already processing now. skip height");
                ClaimDecision::SkipProcessing
            }
            ProcessingStatus::Errored if !self.reprocess_errored => {
                tracing::debug!(
                    height,
                    "block processed with error. enable reprocess_errored to process this height again"
                );
                ClaimDecision::SkipErrored
            }
            ProcessingStatus::Errored | ProcessingStatus::Unprocessed => self.reclaim(height).await,
        }
    }

    async fn reclaim(&self, height: Height) -> ClaimDecision {
        match self.store.reclaim_errored(height).await {
            Ok(true) => {
                tracing::info!(height, "reclaimed height for reprocessing");
                ClaimDecision::Proceed
            }
            Ok(false) => {
                tracing::debug!(height, "height was reclaimed by another worker. skip height");
                ClaimDecision::SkipProcessing
            }
            Err(err) => {
                tracing::error!(height, error = %err, "failed to reclaim height; processing without status");
                ClaimDecision::ProceedUnrecorded
            }
        }
    }

    pub async fn mark_processed(&self, height: Height) {
        if let Err(err) = self.store.mark_processed(height).await {
            tracing::error!(height, error = %err, "failed to mark height processed");
        }
    }

    pub async fn mark_errored(&self, height: Height, message: &str) {
        if let Err(err) = self.store.mark_errored(height, message).await {
            tracing::error!(
                height,
                error = %err,
                diagnostic = message,
                "failed to mark height errored"
            );
        }
    }
}
