use crate::types::{GenesisChunk, Height, RawBlock, Transaction};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub type ChainFuture<'a, T> = BoxFuture<'a, Result<T, ChainError>>;

/// Stream of newly committed heights, ascending.
pub type HeightStream = BoxStream<'static, Height>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("chain node method {method} timed out")]
    Timeout { method: &'static str },
    #[error("chain node {method} call failed: {message}")]
    Transport { method: &'static str, message: String },
    #[error("chain node {method} returned error (code={code}): {message}")]
    Rpc { method: &'static str, code: i32, message: String },
    #[error("height {height} is not available on the chain node")]
    HeightUnavailable { height: Height },
    #[error("malformed {method} response: {message}")]
    Decode { method: &'static str, message: String },
    #[error("chain node request cancelled")]
    Cancelled,
}

impl ChainError {
    pub(crate) fn decode(method: &'static str, message: impl Into<String>) -> Self {
        ChainError::Decode {
            method,
            message: message.into(),
        }
    }

    /// Whether the failure is worth another attempt within the same call.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Timeout { .. } | ChainError::Transport { .. })
    }
}

/// Read access to the chain node the pipeline ingests from.
pub trait ChainNode: Send + Sync + 'static {
    fn latest_height(&self) -> ChainFuture<'_, Height>;

    /// Header data plus the hashes of the block's transactions, in block order.
    fn get_block(&self, height: Height) -> ChainFuture<'_, RawBlock>;

    /// Decoded transactions committed at `height`, in any order.
    fn get_transactions(&self, height: Height) -> ChainFuture<'_, Vec<Transaction>>;

    fn get_genesis_chunk(&self, index: usize) -> ChainFuture<'_, GenesisChunk>;

    /// Emits every height committed after the call, until `shutdown` fires.
    fn subscribe_new_blocks(&self, shutdown: CancellationToken) -> ChainFuture<'_, HeightStream>;
}
