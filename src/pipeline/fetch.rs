//! Block-path fetch and fan-out for heights above genesis.

use super::error::PipelineError;
use crate::chain::{ChainError, ChainFuture, ChainNode};
use crate::modules::{HandlerContext, ModuleRegistry};
use crate::types::{BlockRecord, Height, RawBlock, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;

const GET_BLOCK: &str = "get_block";
const GET_TRANSACTIONS: &str = "get_transactions";

/// Everything the block path hands to modules for one height.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub block: BlockRecord,
    /// Ordered as the block lists them.
    pub transactions: Vec<Transaction>,
}

/// Fetches the block header and its transactions concurrently.
///
/// Either failure drops the other in-flight call and becomes the group's error.
/// The record is assembled only after both calls succeed.
pub async fn fetch_block_data(
    chain: &dyn ChainNode,
    height: Height,
    rpc_timeout: Duration,
) -> Result<BlockData, PipelineError> {
    let (raw, transactions) = tokio::try_join!(
        bounded(GET_BLOCK, rpc_timeout, chain.get_block(height)),
        bounded(GET_TRANSACTIONS, rpc_timeout, chain.get_transactions(height)),
    )?;

    let transactions = order_by_block(&raw, transactions)?;
    let block = BlockRecord::from_parts(raw, &transactions);
    Ok(BlockData {
        block,
        transactions,
    })
}

/// Runs block and transaction dispatch side by side.
///
/// The first failing side cancels the context's group token so the other side's
/// handlers can stop early. A block failure wins when both fail.
pub async fn dispatch_block_data(
    registry: &ModuleRegistry,
    ctx: &HandlerContext,
    data: &BlockData,
) -> Result<(), PipelineError> {
    let group = ctx.cancellation();

    let block = async {
        let result = registry.dispatch_block(ctx, &data.block).await;
        if result.is_err() {
            group.cancel();
        }
        result
    };
    let transactions = async {
        let result = registry.dispatch_transactions(ctx, &data.transactions).await;
        if result.is_err() {
            group.cancel();
        }
        result
    };

    let (block_result, tx_result) = tokio::join!(block, transactions);
    block_result?;
    tx_result?;
    Ok(())
}

async fn bounded<T>(
    method: &'static str,
    limit: Duration,
    call: ChainFuture<'_, T>,
) -> Result<T, PipelineError> {
    match timeout(limit, call).await {
        Ok(result) => result.map_err(PipelineError::Fetch),
        Err(_) => Err(PipelineError::Fetch(ChainError::Timeout { method })),
    }
}

fn order_by_block(
    raw: &RawBlock,
    transactions: Vec<Transaction>,
) -> Result<Vec<Transaction>, PipelineError> {
    if raw.tx_hashes.len() != transactions.len() {
        return Err(PipelineError::decode(format!(
            "block {} lists {} transactions but the node returned {}",
            raw.height,
            raw.tx_hashes.len(),
            transactions.len()
        )));
    }

    let mut by_hash: HashMap<String, Transaction> = transactions
        .into_iter()
        .map(|tx| (tx.hash.to_ascii_uppercase(), tx))
        .collect();

    raw.tx_hashes
        .iter()
        .map(|hash| {
            by_hash.remove(&hash.to_ascii_uppercase()).ok_or_else(|| {
                PipelineError::decode(format!(
                    "transaction {hash} listed in block {} was not returned by the node",
                    raw.height
                ))
            })
        })
        .collect()
}
