//! Chunked genesis download and reassembly.

use super::error::PipelineError;
use crate::chain::{ChainError, ChainNode};
use crate::types::{GenesisChunk, GenesisState};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const GET_GENESIS_CHUNK: &str = "get_genesis_chunk";

/// Upper bound on the chunk count a node may announce. CometBFT serves 16 MiB
/// chunks, so this allows documents far larger than any live chain's genesis.
pub const MAX_GENESIS_CHUNKS: usize = 4096;

/// Chunk requests kept in flight at once.
pub const GENESIS_FETCH_CONCURRENCY: usize = 8;

/// Downloads every genesis chunk and rebuilds the document in index order.
///
/// Chunk 0 is fetched first because it announces the total; the rest are
/// fetched concurrently, at most [`GENESIS_FETCH_CONCURRENCY`] at a time, and
/// may complete in any order.
#[derive(Clone)]
pub struct GenesisAssembler {
    chain: Arc<dyn ChainNode>,
    rpc_timeout: Duration,
}

impl GenesisAssembler {
    pub fn new(chain: Arc<dyn ChainNode>, rpc_timeout: Duration) -> Self {
        Self { chain, rpc_timeout }
    }

    pub async fn fetch(&self) -> Result<GenesisState, PipelineError> {
        let document = self.fetch_document().await?;
        GenesisState::from_document(&document)
            .map_err(|err| PipelineError::decode(format!("invalid genesis document: {err}")))
    }

    /// Raw document bytes, concatenated strictly 0..total.
    pub async fn fetch_document(&self) -> Result<Vec<u8>, PipelineError> {
        let first = fetch_chunk(self.chain.as_ref(), 0, self.rpc_timeout).await?;
        let total = first.total;
        if total == 0 {
            return Err(PipelineError::decode("node reported zero genesis chunks"));
        }
        if total > MAX_GENESIS_CHUNKS {
            return Err(PipelineError::decode(format!(
                "node reported {total} genesis chunks, more than the supported {MAX_GENESIS_CHUNKS}"
            )));
        }

        let mut slots: Vec<Option<Vec<u8>>> = vec![None; total];
        slots[0] = Some(decode_chunk(&first, 0, total)?);

        if total > 1 {
            self.fetch_remaining(total, &mut slots).await?;
        }

        tracing::debug!(chunks = total, "genesis chunks fetched");

        let mut document = Vec::new();
        for (index, slot) in slots.into_iter().enumerate() {
            let bytes = slot
                .ok_or_else(|| PipelineError::decode(format!("genesis chunk {index} is missing")))?;
            document.extend_from_slice(&bytes);
        }
        Ok(document)
    }

    async fn fetch_remaining(
        &self,
        total: usize,
        slots: &mut [Option<Vec<u8>>],
    ) -> Result<(), PipelineError> {
        let group = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut pending = 1..total;

        for index in pending.by_ref().take(GENESIS_FETCH_CONCURRENCY) {
            self.spawn_chunk(&mut tasks, &group, index, total);
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => Err(PipelineError::decode(format!(
                    "genesis chunk task ended unexpectedly: {err}"
                ))),
            };

            match outcome {
                Ok((index, bytes)) => {
                    slots[index] = Some(bytes);
                    if let Some(next) = pending.next() {
                        self.spawn_chunk(&mut tasks, &group, next, total);
                    }
                }
                Err(err) => {
                    group.cancel();
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    tracing::warn!(error = %err, "genesis chunk fetch failed; cancelled remaining chunks");
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    fn spawn_chunk(
        &self,
        tasks: &mut JoinSet<Result<(usize, Vec<u8>), PipelineError>>,
        group: &CancellationToken,
        index: usize,
        total: usize,
    ) {
        let chain = self.chain.clone();
        let group = group.clone();
        let rpc_timeout = self.rpc_timeout;
        tasks.spawn(async move {
            tokio::select! {
                _ = group.cancelled() => Err(PipelineError::Fetch(ChainError::Cancelled)),
                fetched = fetch_indexed(chain.as_ref(), index, total, rpc_timeout) => fetched,
            }
        });
    }
}

async fn fetch_chunk(
    chain: &dyn ChainNode,
    index: usize,
    rpc_timeout: Duration,
) -> Result<GenesisChunk, PipelineError> {
    match timeout(rpc_timeout, chain.get_genesis_chunk(index)).await {
        Ok(result) => result.map_err(PipelineError::Fetch),
        Err(_) => Err(PipelineError::Fetch(ChainError::Timeout {
            method: GET_GENESIS_CHUNK,
        })),
    }
}

async fn fetch_indexed(
    chain: &dyn ChainNode,
    index: usize,
    total: usize,
    rpc_timeout: Duration,
) -> Result<(usize, Vec<u8>), PipelineError> {
    let chunk = fetch_chunk(chain, index, rpc_timeout).await?;
    decode_chunk(&chunk, index, total).map(|bytes| (index, bytes))
}

fn decode_chunk(chunk: &GenesisChunk, index: usize, total: usize) -> Result<Vec<u8>, PipelineError> {
    if chunk.index != index || chunk.total != total {
        return Err(PipelineError::decode(format!(
            "expected genesis chunk {index}/{total}, node returned {}/{}",
            chunk.index, chunk.total
        )));
    }
    STANDARD
        .decode(chunk.data.as_bytes())
        .map_err(|err| PipelineError::decode(format!("genesis chunk {index} is not base64: {err}")))
}
