use crate::types::{BlockRecord, GenesisState, Height, Transaction};
use anyhow::Error as AnyError;
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AnyError>> + Send + 'a>>;

/// Dispatch kinds a module can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStage {
    Block,
    Transaction,
    Genesis,
}

impl HandlerStage {
    pub fn as_str(self) -> &'static str {
        match self {
            HandlerStage::Block => "block",
            HandlerStage::Transaction => "transaction",
            HandlerStage::Genesis => "genesis",
        }
    }
}

impl fmt::Display for HandlerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-invocation context shared by every handler call for one height.
///
/// `cancellation` fires when a sibling dispatch for the same height has
/// already failed; long-running handlers may observe it to stop early.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    height: Height,
    worker: usize,
    cancellation: CancellationToken,
}

impl HandlerContext {
    pub fn new(height: Height, worker: usize, cancellation: CancellationToken) -> Self {
        Self {
            height,
            worker,
            cancellation,
        }
    }

    pub fn height(&self) -> Height {
        self.height
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

pub trait BlockHandler: Send + Sync + 'static {
    fn handle_block<'a>(&'a self, ctx: &'a HandlerContext, block: &'a BlockRecord) -> HandlerFuture<'a>;
}

pub trait TransactionHandler: Send + Sync + 'static {
    fn handle_transaction<'a>(
        &'a self,
        ctx: &'a HandlerContext,
        tx: &'a Transaction,
    ) -> HandlerFuture<'a>;
}

pub trait GenesisHandler: Send + Sync + 'static {
    fn handle_genesis<'a>(
        &'a self,
        ctx: &'a HandlerContext,
        genesis: &'a GenesisState,
    ) -> HandlerFuture<'a>;
}

/// A named handler advertising any non-empty subset of the capabilities.
///
/// Implementors opt into a capability by returning `Some(self)` from the
/// matching accessor; the registry calls each accessor exactly once.
pub trait Module: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn as_block_handler(self: Arc<Self>) -> Option<Arc<dyn BlockHandler>> {
        None
    }

    fn as_transaction_handler(self: Arc<Self>) -> Option<Arc<dyn TransactionHandler>> {
        None
    }

    fn as_genesis_handler(self: Arc<Self>) -> Option<Arc<dyn GenesisHandler>> {
        None
    }
}

/// Failure raised by a handler, tagged with the module and dispatch kind.
#[derive(Debug, Error)]
#[error("module {module} failed to handle {stage}: {source}")]
pub struct ModuleError {
    module: String,
    stage: HandlerStage,
    source: AnyError,
}

impl ModuleError {
    pub fn new(module: impl Into<String>, stage: HandlerStage, source: AnyError) -> Self {
        Self {
            module: module.into(),
            stage,
            source,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn stage(&self) -> HandlerStage {
        self.stage
    }

    pub fn into_source(self) -> AnyError {
        self.source
    }
}
