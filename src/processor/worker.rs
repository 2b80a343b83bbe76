use super::queue::HeightQueue;
use crate::pipeline::HeightPipeline;
use crate::types::Height;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Pulls heights until shutdown or until the queue is closed and drained.
///
/// Shutdown is only observed between heights; a height in flight always runs
/// to its final status.
pub(crate) struct Worker {
    id: usize,
    queue: Arc<HeightQueue>,
    pipeline: Arc<HeightPipeline>,
    shutdown: CancellationToken,
    recovery_mode: bool,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        queue: Arc<HeightQueue>,
        pipeline: Arc<HeightPipeline>,
        shutdown: CancellationToken,
        recovery_mode: bool,
    ) -> Self {
        Self {
            id,
            queue,
            pipeline,
            shutdown,
            recovery_mode,
        }
    }

    #[tracing::instrument(name = "worker", skip_all, fields(worker = self.id))]
    pub(crate) async fn run(self) {
        tracing::debug!("worker started");

        loop {
            let height = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tracing::debug!("shutdown requested");
                    break;
                }
                next = self.queue.pop() => match next {
                    Some(height) => height,
                    None => {
                        tracing::debug!("height queue closed and drained");
                        break;
                    }
                },
            };

            self.process(height).await;
        }

        tracing::debug!("worker stopped");
    }

    async fn process(&self, height: Height) {
        if !self.recovery_mode {
            self.pipeline.process(height, self.id).await;
            return;
        }

        let result = AssertUnwindSafe(self.pipeline.process(height, self.id))
            .catch_unwind()
            .await;

        if let Err(payload) = result {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                height,
                worker = self.id,
                panic = %message,
                "recovered from panic while processing height"
            );
            self.pipeline.record_panic(height, &message).await;
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
