//! Capability-classified dispatch lists built once from the registered modules.
//!
//! Block and transaction dispatch stop at the first handler error. Genesis
//! dispatch logs failures and keeps going, because genesis runs exactly once and
//! partial ingestion is preferred over none.

use super::handler::{
    BlockHandler, GenesisHandler, HandlerContext, HandlerStage, Module, ModuleError,
    TransactionHandler,
};
use crate::types::{BlockRecord, GenesisState, Transaction};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("module {0} is registered more than once")]
    DuplicateModule(String),
    #[error("module {0} does not implement any handler capability")]
    NoCapabilities(String),
}

struct Registered<H: ?Sized> {
    name: Arc<str>,
    handler: Arc<H>,
}

/// Outcome of a genesis fan-out; failures are reported, never propagated.
#[derive(Debug, Default)]
pub struct GenesisReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<ModuleError>,
}

impl GenesisReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ModuleRegistry {
    names: Vec<Arc<str>>,
    block_handlers: Vec<Registered<dyn BlockHandler>>,
    transaction_handlers: Vec<Registered<dyn TransactionHandler>>,
    genesis_handlers: Vec<Registered<dyn GenesisHandler>>,
}

impl ModuleRegistry {
    /// Classifies `modules` by capability, preserving registration order.
    pub fn new(modules: Vec<Arc<dyn Module>>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        let mut registry = Self {
            names: Vec::with_capacity(modules.len()),
            block_handlers: Vec::new(),
            transaction_handlers: Vec::new(),
            genesis_handlers: Vec::new(),
        };

        for module in modules {
            let name: Arc<str> = Arc::from(module.name());
            if !seen.insert(name.clone()) {
                return Err(RegistryError::DuplicateModule(name.to_string()));
            }

            let mut capabilities = 0;
            if let Some(handler) = module.clone().as_block_handler() {
                registry.block_handlers.push(Registered {
                    name: name.clone(),
                    handler,
                });
                capabilities += 1;
            }
            if let Some(handler) = module.clone().as_transaction_handler() {
                registry.transaction_handlers.push(Registered {
                    name: name.clone(),
                    handler,
                });
                capabilities += 1;
            }
            if let Some(handler) = module.as_genesis_handler() {
                registry.genesis_handlers.push(Registered {
                    name: name.clone(),
                    handler,
                });
                capabilities += 1;
            }

            if capabilities == 0 {
                return Err(RegistryError::NoCapabilities(name.to_string()));
            }

            tracing::debug!(module = %name, capabilities, "registered module");
            registry.names.push(name);
        }

        Ok(registry)
    }

    /// Registered module names in registration order.
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(AsRef::as_ref)
    }

    pub fn block_modules(&self) -> impl Iterator<Item = &str> {
        self.block_handlers.iter().map(|entry| entry.name.as_ref())
    }

    pub fn transaction_modules(&self) -> impl Iterator<Item = &str> {
        self.transaction_handlers.iter().map(|entry| entry.name.as_ref())
    }

    pub fn genesis_modules(&self) -> impl Iterator<Item = &str> {
        self.genesis_handlers.iter().map(|entry| entry.name.as_ref())
    }

    pub async fn dispatch_block(
        &self,
        ctx: &HandlerContext,
        block: &BlockRecord,
    ) -> Result<(), ModuleError> {
        for entry in &self.block_handlers {
            if let Err(err) = entry.handler.handle_block(ctx, block).await {
                tracing::error!(
                    height = ctx.height(),
                    module = %entry.name,
                    error = %err,
                    "block handler failed"
                );
                return Err(ModuleError::new(entry.name.as_ref(), HandlerStage::Block, err));
            }
        }
        Ok(())
    }

    /// Runs every transaction through every transaction module, transaction by
    /// transaction.
    pub async fn dispatch_transactions(
        &self,
        ctx: &HandlerContext,
        transactions: &[Transaction],
    ) -> Result<(), ModuleError> {
        if self.transaction_handlers.is_empty() {
            return Ok(());
        }

        for tx in transactions {
            for entry in &self.transaction_handlers {
                if let Err(err) = entry.handler.handle_transaction(ctx, tx).await {
                    tracing::error!(
                        height = ctx.height(),
                        module = %entry.name,
                        tx_hash = %tx.hash,
                        error = %err,
                        "transaction handler failed"
                    );
                    return Err(ModuleError::new(
                        entry.name.as_ref(),
                        HandlerStage::Transaction,
                        err,
                    ));
                }
            }
        }
        Ok(())
    }

    pub async fn dispatch_genesis(&self, ctx: &HandlerContext, genesis: &GenesisState) -> GenesisReport {
        let mut report = GenesisReport::default();

        for entry in &self.genesis_handlers {
            match entry.handler.handle_genesis(ctx, genesis).await {
                Ok(()) => report.succeeded.push(entry.name.to_string()),
                Err(err) => {
                    tracing::error!(
                        module = %entry.name,
                        error = %err,
                        "genesis handler failed; continuing with remaining modules"
                    );
                    report.failed.push(ModuleError::new(
                        entry.name.as_ref(),
                        HandlerStage::Genesis,
                        err,
                    ));
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names)
            .field("block", &self.block_handlers.len())
            .field("transaction", &self.transaction_handlers.len())
            .field("genesis", &self.genesis_handlers.len())
            .finish()
    }
}
