//! Worker task spawning and teardown.

use super::queue::HeightQueue;
use super::worker::{panic_message, Worker};
use crate::pipeline::HeightPipeline;
use crate::runtime::fatal::FatalErrorHandler;
use futures::FutureExt;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct WorkerPoolParams {
    pub worker_count: usize,
    pub recovery_mode: bool,
    pub queue: Arc<HeightQueue>,
    pub pipeline: Arc<HeightPipeline>,
    pub shutdown: CancellationToken,
    pub fatal_handler: FatalErrorHandler,
}

pub(crate) struct WorkerPool {
    queue: Arc<HeightQueue>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    remaining_workers: Arc<AtomicUsize>,
    workers_done_rx: watch::Receiver<bool>,
}

impl WorkerPool {
    pub(crate) fn start(params: WorkerPoolParams) -> Self {
        let WorkerPoolParams {
            worker_count,
            recovery_mode,
            queue,
            pipeline,
            shutdown,
            fatal_handler,
        } = params;

        let worker_count = worker_count.max(1);
        let (workers_done_tx, workers_done_rx) = watch::channel(false);
        let remaining_workers = Arc::new(AtomicUsize::new(worker_count));
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let worker = Worker::new(
                worker_id,
                queue.clone(),
                pipeline.clone(),
                shutdown.clone(),
                recovery_mode,
            );
            let workers_done = workers_done_tx.clone();
            let remaining_workers = remaining_workers.clone();
            let fatal_handler = fatal_handler.clone();

            workers.push(tokio::spawn(async move {
                let result = std::panic::AssertUnwindSafe(worker.run())
                    .catch_unwind()
                    .await;

                if let Err(panic_payload) = result {
                    let panic_msg = panic_message(panic_payload.as_ref());
                    tracing::error!(
                        worker = worker_id,
                        panic = %panic_msg,
                        "worker task panicked"
                    );
                    fatal_handler.record_worker_exit(
                        worker_id,
                        anyhow::anyhow!("worker {worker_id} panicked: {panic_msg}"),
                    );
                }

                if remaining_workers.fetch_sub(1, Ordering::SeqCst) == 1 {
                    let _ = workers_done.send(true);
                }
            }));
        }

        tracing::info!(workers = worker_count, recovery_mode, "worker pool started");

        Self {
            queue,
            shutdown,
            workers,
            remaining_workers,
            workers_done_rx,
        }
    }

    pub(crate) fn live_workers(&self) -> usize {
        self.remaining_workers.load(Ordering::SeqCst)
    }

    /// Flips to `true` once every worker task has returned.
    pub(crate) fn workers_done(&self) -> watch::Receiver<bool> {
        self.workers_done_rx.clone()
    }

    /// Closes the queue, signals shutdown, and waits for in-flight heights.
    pub(crate) async fn stop(&mut self) {
        self.queue.close().await;
        self.shutdown.cancel();

        for handle in std::mem::take(&mut self.workers) {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "worker task join failed");
            }
        }
    }
}
