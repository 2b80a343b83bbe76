use crate::processor::HeightQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Per-height outcome counters shared by every worker.
#[derive(Default, Debug)]
pub struct Telemetry {
    processed_heights: AtomicU64,
    errored_heights: AtomicU64,
    skipped_heights: AtomicU64,
    recovered_panics: AtomicU64,
    fetch_errors: AtomicU64,
    genesis_module_failures: AtomicU64,
}

impl Telemetry {
    pub fn record_processed(&self) {
        self.processed_heights.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_errored(&self) {
        self.errored_heights.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped_heights.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovered_panic(&self) {
        self.recovered_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_genesis_module_failures(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.genesis_module_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            processed_heights: self.processed_heights.load(Ordering::Relaxed),
            errored_heights: self.errored_heights.load(Ordering::Relaxed),
            skipped_heights: self.skipped_heights.load(Ordering::Relaxed),
            recovered_panics: self.recovered_panics.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            genesis_module_failures: self.genesis_module_failures.load(Ordering::Relaxed),
        }
    }

    pub fn processed_heights(&self) -> u64 {
        self.processed_heights.load(Ordering::Relaxed)
    }

    pub fn errored_heights(&self) -> u64 {
        self.errored_heights.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub processed_heights: u64,
    pub errored_heights: u64,
    pub skipped_heights: u64,
    pub recovered_panics: u64,
    pub fetch_errors: u64,
    pub genesis_module_failures: u64,
}

impl TelemetrySnapshot {
    /// Heights that reached a final status.
    pub fn finished_heights(&self) -> u64 {
        self.processed_heights + self.errored_heights
    }
}

/// Spawns a background task that periodically logs throughput, queue depth, and failure counts.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    queue: Arc<HeightQueue>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "blockcrawler::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let finished_delta = current_snapshot
                        .finished_heights()
                        .saturating_sub(last_snapshot.finished_heights());
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        finished_delta as f64 / elapsed
                    };
                    let queued_heights = queue.len().await;

                    tracing::info!(
                        target: "blockcrawler::metrics",
                        throughput = format!("{throughput:.2}"),
                        processed = current_snapshot.processed_heights,
                        errored = current_snapshot.errored_heights,
                        skipped = current_snapshot.skipped_heights,
                        recovered_panics = current_snapshot.recovered_panics,
                        fetch_errors = current_snapshot.fetch_errors,
                        genesis_module_failures = current_snapshot.genesis_module_failures,
                        queued_heights,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
