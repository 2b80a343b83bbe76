//! Feeds the height queue: a bounded catch-up range first, then the node's live
//! stream of new heights.

use super::queue::HeightQueue;
use crate::chain::ChainNode;
use crate::types::{Height, GENESIS_HEIGHT};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DispatchPlan {
    pub start_height: Height,
    pub stop_height: Option<Height>,
    pub process_genesis: bool,
    pub process_new_blocks: bool,
}

impl DispatchPlan {
    /// Last catch-up height given the tip read at startup.
    fn catch_up_end(&self, latest_height: Height) -> Height {
        self.stop_height.unwrap_or(latest_height)
    }

    /// Live mode only applies to open-ended runs.
    fn follows_tip(&self) -> bool {
        self.process_new_blocks && self.stop_height.is_none()
    }
}

pub(crate) struct HeightDispatcher {
    chain: Arc<dyn ChainNode>,
    queue: Arc<HeightQueue>,
    shutdown: CancellationToken,
    plan: DispatchPlan,
    highest_enqueued: Option<Height>,
}

enum Enqueue {
    Accepted,
    Stopped,
}

impl HeightDispatcher {
    pub(crate) fn new(
        chain: Arc<dyn ChainNode>,
        queue: Arc<HeightQueue>,
        shutdown: CancellationToken,
        plan: DispatchPlan,
    ) -> Self {
        Self {
            chain,
            queue,
            shutdown,
            plan,
            highest_enqueued: None,
        }
    }

    pub(crate) fn spawn(self, latest_height: Height) -> JoinHandle<()> {
        tokio::spawn(self.run(latest_height))
    }

    async fn run(mut self, latest_height: Height) {
        // Subscribe before the catch-up pass so nothing committed meanwhile is lost.
        let live = if self.plan.follows_tip() {
            match self.chain.subscribe_new_blocks(self.shutdown.clone()).await {
                Ok(stream) => Some(stream),
                Err(err) => {
                    tracing::error!(error = %err, "failed to subscribe to new blocks; live mode disabled");
                    None
                }
            }
        } else {
            None
        };

        let end = self.plan.catch_up_end(latest_height);
        tracing::info!(
            start_height = self.plan.start_height,
            end_height = end,
            process_genesis = self.plan.process_genesis,
            "dispatching catch-up range"
        );

        if self.catch_up(end).await {
            if let Some(mut stream) = live {
                tracing::info!(
                    highest_enqueued = self.highest_enqueued,
                    "following new blocks"
                );
                loop {
                    let next = tokio::select! {
                        _ = self.shutdown.cancelled() => None,
                        next = stream.next() => next,
                    };
                    let Some(height) = next else { break };
                    if let Enqueue::Stopped = self.enqueue_through(height).await {
                        break;
                    }
                }
            }
        }

        self.queue.close().await;
        tracing::info!(highest_enqueued = self.highest_enqueued, "height dispatcher stopped");
    }

    /// Returns `false` when shutdown or a closed queue interrupted the range.
    async fn catch_up(&mut self, end: Height) -> bool {
        if self.plan.process_genesis {
            if let Enqueue::Stopped = self.enqueue(GENESIS_HEIGHT).await {
                return false;
            }
        }

        let first = self.plan.start_height.max(GENESIS_HEIGHT + 1);
        for height in first..=end {
            if let Enqueue::Stopped = self.enqueue(height).await {
                return false;
            }
        }
        true
    }

    /// Enqueues every height above the highest already enqueued, up to `height`.
    /// Repeated or stale notifications are dropped here.
    async fn enqueue_through(&mut self, height: Height) -> Enqueue {
        let next = self
            .highest_enqueued
            .map_or(self.plan.start_height, |highest| highest + 1)
            .max(GENESIS_HEIGHT + 1);
        for candidate in next..=height {
            if let Enqueue::Stopped = self.enqueue(candidate).await {
                return Enqueue::Stopped;
            }
        }
        Enqueue::Accepted
    }

    async fn enqueue(&mut self, height: Height) -> Enqueue {
        let pushed = tokio::select! {
            _ = self.shutdown.cancelled() => return Enqueue::Stopped,
            pushed = self.queue.push(height) => pushed,
        };

        match pushed {
            Ok(()) => {
                self.highest_enqueued = Some(self.highest_enqueued.map_or(height, |h| h.max(height)));
                Enqueue::Accepted
            }
            Err(err) => {
                tracing::debug!(error = %err, "height queue closed; dispatcher stopping");
                Enqueue::Stopped
            }
        }
    }
}
