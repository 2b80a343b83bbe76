//! The full life of one height, from claim to final status.

use super::error::PipelineError;
use super::fetch::{dispatch_block_data, fetch_block_data};
use super::genesis::GenesisAssembler;
use crate::chain::ChainNode;
use crate::modules::{HandlerContext, ModuleRegistry};
use crate::runtime::telemetry::Telemetry;
use crate::status::{BlockStateMachine, ClaimDecision};
use crate::types::{Height, GENESIS_HEIGHT};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightOutcome {
    Processed,
    Errored,
    Skipped(ClaimDecision),
}

pub struct HeightPipelineParams {
    pub chain: Arc<dyn ChainNode>,
    pub machine: BlockStateMachine,
    pub registry: Arc<ModuleRegistry>,
    pub telemetry: Arc<Telemetry>,
    pub rpc_timeout: Duration,
}

/// Shared by every worker; holds no per-height state.
pub struct HeightPipeline {
    chain: Arc<dyn ChainNode>,
    machine: BlockStateMachine,
    registry: Arc<ModuleRegistry>,
    telemetry: Arc<Telemetry>,
    genesis: GenesisAssembler,
    rpc_timeout: Duration,
}

impl HeightPipeline {
    pub fn new(params: HeightPipelineParams) -> Self {
        let HeightPipelineParams {
            chain,
            machine,
            registry,
            telemetry,
            rpc_timeout,
        } = params;

        Self {
            genesis: GenesisAssembler::new(chain.clone(), rpc_timeout),
            chain,
            machine,
            registry,
            telemetry,
            rpc_timeout,
        }
    }

    pub fn machine(&self) -> &BlockStateMachine {
        &self.machine
    }

    /// Claims `height` and, if this worker won it, ingests it and records the
    /// final status. Never returns an error: failures end up in the store.
    pub async fn process(&self, height: Height, worker: usize) -> HeightOutcome {
        let decision = self.machine.claim(height).await;
        if !decision.should_process() {
            self.telemetry.record_skipped();
            return HeightOutcome::Skipped(decision);
        }

        let result = if height == GENESIS_HEIGHT {
            self.process_genesis(worker).await
        } else {
            self.process_block(height, worker).await
        };

        match result {
            Ok(()) => {
                self.machine.mark_processed(height).await;
                self.telemetry.record_processed();
                tracing::debug!(height, worker, "height processed");
                HeightOutcome::Processed
            }
            Err(err) => {
                if matches!(err, PipelineError::Fetch(_)) {
                    self.telemetry.record_fetch_error();
                }
                tracing::error!(height, worker, error = %err, "failed to process height");
                self.machine.mark_errored(height, &err.to_string()).await;
                self.telemetry.record_errored();
                HeightOutcome::Errored
            }
        }
    }

    /// Records a panic caught around [`HeightPipeline::process`].
    pub async fn record_panic(&self, height: Height, message: &str) {
        self.machine
            .mark_errored(height, &format!("panic: {message}"))
            .await;
        self.telemetry.record_recovered_panic();
        self.telemetry.record_errored();
    }

    async fn process_block(&self, height: Height, worker: usize) -> Result<(), PipelineError> {
        let data = fetch_block_data(self.chain.as_ref(), height, self.rpc_timeout).await?;
        tracing::trace!(
            height,
            worker,
            txs = data.transactions.len(),
            total_gas = data.block.total_gas(),
            "block data fetched"
        );

        let ctx = HandlerContext::new(height, worker, CancellationToken::new());
        dispatch_block_data(&self.registry, &ctx, &data).await
    }

    async fn process_genesis(&self, worker: usize) -> Result<(), PipelineError> {
        tracing::info!(worker, "parsing genesis");
        let genesis = self.genesis.fetch().await?;

        let ctx = HandlerContext::new(GENESIS_HEIGHT, worker, CancellationToken::new());
        let report = self.registry.dispatch_genesis(&ctx, &genesis).await;
        if !report.is_clean() {
            self.telemetry
                .record_genesis_module_failures(report.failed.len() as u64);
            tracing::warn!(
                chain_id = %genesis.chain_id,
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "genesis ingested with module failures"
            );
        } else {
            tracing::info!(
                chain_id = %genesis.chain_id,
                modules = report.succeeded.len(),
                "genesis ingested"
            );
        }
        Ok(())
    }
}
