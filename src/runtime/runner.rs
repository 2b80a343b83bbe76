use crate::chain::{ChainNode, CometRpcClient};
use crate::modules::{EventPublisher, ModuleRegistry};
use crate::pipeline::{HeightPipeline, HeightPipelineParams};
use crate::processor::dispatcher::{DispatchPlan, HeightDispatcher};
use crate::processor::worker_pool::{WorkerPool, WorkerPoolParams};
use crate::processor::HeightQueue;
use crate::runtime::config::CrawlerConfig;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::status::{BlockStateMachine, LivenessCheck, StatusStore};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

struct RunningPipeline {
    pool: WorkerPool,
    dispatcher: JoinHandle<()>,
    reporter: JoinHandle<()>,
    workers_done: watch::Receiver<bool>,
}

/// Wires the dispatcher, worker pool and metrics reporter, and handles OS
/// signals for graceful shutdowns.
pub struct Runner {
    config: CrawlerConfig,
    chain: Arc<dyn ChainNode>,
    store: Arc<dyn StatusStore>,
    registry: Arc<ModuleRegistry>,
    publisher: Arc<dyn EventPublisher>,
    telemetry: Arc<Telemetry>,
    fatal_handler: FatalErrorHandler,
    shutdown: CancellationToken,
    running: Option<RunningPipeline>,
}

impl Runner {
    pub fn new(
        config: CrawlerConfig,
        chain: Arc<dyn ChainNode>,
        store: Arc<dyn StatusStore>,
        registry: ModuleRegistry,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            config,
            chain,
            store,
            registry: Arc::new(registry),
            publisher,
            telemetry: Arc::new(Telemetry::default()),
            fatal_handler: FatalErrorHandler::new(),
            shutdown: CancellationToken::new(),
            running: None,
        }
    }

    /// Builds a runner backed by a [`CometRpcClient`] for `config.rpc_url()`.
    pub fn connect(
        config: CrawlerConfig,
        store: Arc<dyn StatusStore>,
        registry: ModuleRegistry,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self> {
        let client = CometRpcClient::from_config(&config)
            .with_context(|| format!("failed to create chain node client for {}", config.rpc_url()))?;
        Ok(Self::new(config, Arc::new(client), store, registry, publisher))
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn liveness(&self) -> LivenessCheck {
        LivenessCheck::new(self.store.clone(), self.config.max_lag())
    }

    /// Checks the publisher and chain node, then spawns the pipeline tasks.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }

        self.config.validate()?;

        self.publisher
            .ping()
            .await
            .context("event publisher is unreachable")?;

        let latest_height = timeout(self.config.rpc_timeout(), self.chain.latest_height())
            .await
            .map_err(|_| anyhow!("timed out reading the latest height from the chain node"))?
            .context("failed to read the latest height from the chain node")?;

        tracing::info!(
            latest_height,
            start_height = self.config.start_height(),
            stop_height = self.config.stop_height(),
            workers = self.config.worker_count(),
            modules = ?self.registry.module_names().collect::<Vec<_>>(),
            "starting crawler"
        );

        let queue = Arc::new(HeightQueue::new(self.config.queue_capacity()));
        let pipeline = Arc::new(HeightPipeline::new(HeightPipelineParams {
            chain: self.chain.clone(),
            machine: BlockStateMachine::new(self.store.clone(), self.config.reprocess_errored()),
            registry: self.registry.clone(),
            telemetry: self.telemetry.clone(),
            rpc_timeout: self.config.rpc_timeout(),
        }));

        let reporter = spawn_metrics_reporter(
            self.telemetry.clone(),
            queue.clone(),
            self.shutdown.child_token(),
            self.config.metrics_interval(),
        );

        let pool = WorkerPool::start(WorkerPoolParams {
            worker_count: self.config.worker_count(),
            recovery_mode: self.config.recovery_mode(),
            queue: queue.clone(),
            pipeline,
            shutdown: self.shutdown.child_token(),
            fatal_handler: self.fatal_handler.clone(),
        });
        let workers_done = pool.workers_done();

        let dispatcher = HeightDispatcher::new(
            self.chain.clone(),
            queue,
            self.shutdown.child_token(),
            DispatchPlan {
                start_height: self.config.start_height(),
                stop_height: self.config.stop_height(),
                process_genesis: self.config.process_genesis(),
                process_new_blocks: self.config.process_new_blocks(),
            },
        )
        .spawn(latest_height);

        self.running = Some(RunningPipeline {
            pool,
            dispatcher,
            reporter,
            workers_done,
        });
        Ok(())
    }

    /// Resolves once every worker has exited, e.g. after a bounded catch-up
    /// range has been drained. Returns immediately when not started.
    pub async fn wait(&mut self) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if running.workers_done.wait_for(|done| *done).await.is_err() {
            tracing::debug!("worker pool dropped before signalling completion");
        }
    }

    /// Stops the pipeline gracefully; in-flight heights finish first.
    ///
    /// Returns the first worker termination captured while running.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        self.shutdown.cancel();
        running.pool.stop().await;
        tracing::debug!(live_workers = running.pool.live_workers(), "worker pool stopped");

        for (task, handle) in [
            ("dispatcher", running.dispatcher),
            ("metrics reporter", running.reporter),
        ] {
            if let Err(err) = handle.await {
                tracing::warn!(task, error = %err, "background task join failed");
            }
        }

        self.shutdown = CancellationToken::new();
        tracing::info!(snapshot = ?self.telemetry.snapshot(), "crawler stopped");

        match self.fatal_handler.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Runs until a Ctrl-C (SIGINT) is received, the shutdown token is cancelled
    /// elsewhere, or every worker has exited.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        let shutdown = self.shutdown.clone();
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
            _ = self.wait() => {
                tracing::info!("all workers exited");
            }
        }

        self.stop().await
    }
}
