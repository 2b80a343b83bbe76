//! Passthrough module that republishes every normalized record unchanged.

use super::handler::{
    BlockHandler, GenesisHandler, HandlerContext, HandlerFuture, Module, TransactionHandler,
};
use super::publisher::{EventPublisher, PublishError};
use crate::types::{BlockRecord, GenesisState, Transaction};
use serde::Serialize;
use std::sync::Arc;

pub const RAW_BLOCK_TOPIC: &str = "raw_block";
pub const RAW_TRANSACTION_TOPIC: &str = "raw_transaction";
pub const RAW_GENESIS_TOPIC: &str = "raw_genesis";

pub struct RawModule {
    publisher: Arc<dyn EventPublisher>,
}

impl RawModule {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    async fn publish_json<T: Serialize>(&self, topic: &str, record: &T) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(record).map_err(|source| PublishError::Serialize {
            topic: topic.to_string(),
            source,
        })?;
        self.publisher.publish(topic, payload).await
    }
}

impl Module for RawModule {
    fn name(&self) -> &str {
        "raw"
    }

    fn as_block_handler(self: Arc<Self>) -> Option<Arc<dyn BlockHandler>> {
        Some(self)
    }

    fn as_transaction_handler(self: Arc<Self>) -> Option<Arc<dyn TransactionHandler>> {
        Some(self)
    }

    fn as_genesis_handler(self: Arc<Self>) -> Option<Arc<dyn GenesisHandler>> {
        Some(self)
    }
}

impl BlockHandler for RawModule {
    fn handle_block<'a>(&'a self, _ctx: &'a HandlerContext, block: &'a BlockRecord) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.publish_json(RAW_BLOCK_TOPIC, block).await?;
            Ok(())
        })
    }
}

impl TransactionHandler for RawModule {
    fn handle_transaction<'a>(
        &'a self,
        _ctx: &'a HandlerContext,
        tx: &'a Transaction,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.publish_json(RAW_TRANSACTION_TOPIC, tx).await?;
            Ok(())
        })
    }
}

impl GenesisHandler for RawModule {
    fn handle_genesis<'a>(
        &'a self,
        _ctx: &'a HandlerContext,
        genesis: &'a GenesisState,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.publish_json(RAW_GENESIS_TOPIC, genesis).await?;
            Ok(())
        })
    }
}
