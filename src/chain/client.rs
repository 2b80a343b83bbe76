//! JSON-RPC client for CometBFT nodes. Houses `CometRpcClient`, its retry loop,
//! and the `ChainNode` implementation the workers consume.

use super::decode::AddressCodec;
use super::metrics::{RpcMetrics, RpcMetricsSnapshot};
use super::node::{ChainError, ChainFuture, ChainNode, HeightStream};
use super::options::RpcClientOptions;
use super::payload::{
    BlockResponse, GenesisChunkResponse, StatusResponse, TxSearchResponse, BLOCK_METHOD,
    GENESIS_CHUNKED_METHOD, STATUS_METHOD, TX_SEARCH_METHOD,
};
use super::retry::RetryContext;
use crate::runtime::config::CrawlerConfig;
use crate::types::{GenesisChunk, Height, RawBlock, Transaction};
use anyhow::{anyhow, Context, Result};
use futures::stream::{self, StreamExt};
use jsonrpsee::core::client::{ClientT, Error as JsonRpcError};
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use std::{future::Future, sync::Arc};
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const HEIGHT_NOT_AVAILABLE_MARKERS: [&str; 2] = [
    "must be less than or equal to the current blockchain height",
    "is not available, lowest height is",
];

#[derive(Debug, Clone)]
pub struct CometRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
    addresses: AddressCodec,
}

impl CometRpcClient {
    pub fn new(url: impl Into<String>, addresses: AddressCodec) -> Result<Self> {
        Self::with_options(url, addresses, RpcClientOptions::default())
    }

    pub fn with_options(
        url: impl Into<String>,
        addresses: AddressCodec,
        options: RpcClientOptions,
    ) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;
        let client = HttpClientBuilder::default()
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build chain node client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            metrics: Arc::new(RpcMetrics::default()),
            addresses,
        })
    }

    pub fn from_config(config: &CrawlerConfig) -> Result<Self> {
        config.validate()?;
        let addresses = AddressCodec::new(config.account_prefix(), config.consensus_prefix())
            .context("failed to configure address codec")?;
        let options = RpcClientOptions {
            max_concurrent_requests: std::cmp::max(32, config.worker_count().saturating_mul(8)),
            request_timeout: config.rpc_timeout(),
            poll_interval: config.poll_interval(),
            ..RpcClientOptions::default()
        };
        Self::with_options(config.rpc_url().to_owned(), addresses, options)
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn fetch_latest_height(&self) -> Result<Height, ChainError> {
        let status: StatusResponse = self
            .retry(RetryContext::new(STATUS_METHOD), || {
                self.call(STATUS_METHOD, ObjectParams::new())
            })
            .await?;
        Ok(status.sync_info.latest_block_height)
    }

    pub async fn fetch_block(&self, height: Height) -> Result<RawBlock, ChainError> {
        let response: BlockResponse = self
            .retry(RetryContext::for_height(BLOCK_METHOD, height), || async move {
                let params = object_params(&[("height", height.to_string())])?;
                self.call(BLOCK_METHOD, params).await
            })
            .await?;
        response.into_raw_block(&self.addresses)
    }

    /// Pages through `tx_search` for every transaction committed at `height`.
    pub async fn fetch_transactions(&self, height: Height) -> Result<Vec<Transaction>, ChainError> {
        let query = format!("tx.height={height}");
        let per_page = self.options.tx_page_size;
        let mut transactions = Vec::new();
        let mut page = 1usize;

        loop {
            let query = query.as_str();
            let response: TxSearchResponse = self
                .retry(RetryContext::for_height(TX_SEARCH_METHOD, height), || async move {
                    let mut params = object_params(&[
                        ("query", query.to_string()),
                        ("page", page.to_string()),
                        ("per_page", per_page.to_string()),
                        ("order_by", "asc".to_string()),
                    ])?;
                    params
                        .insert("prove", false)
                        .map_err(|err| ChainError::decode(TX_SEARCH_METHOD, err.to_string()))?;
                    self.call(TX_SEARCH_METHOD, params).await
                })
                .await?;

            let received = response.txs.len();
            for entry in response.txs {
                transactions.push(entry.into_transaction(&self.addresses)?);
            }

            let total = usize::try_from(response.total_count).unwrap_or(usize::MAX);
            if received == 0 || transactions.len() >= total {
                break;
            }
            page += 1;
        }

        tracing::trace!(height, count = transactions.len(), "fetched transactions");
        Ok(transactions)
    }

    pub async fn fetch_genesis_chunk(&self, index: usize) -> Result<GenesisChunk, ChainError> {
        let response: GenesisChunkResponse = self
            .retry(RetryContext::new(GENESIS_CHUNKED_METHOD), || async move {
                let params = object_params(&[("chunk", index.to_string())])?;
                self.call(GENESIS_CHUNKED_METHOD, params).await
            })
            .await?;
        response.into_chunk()
    }

    /// Bounded retry for transient failures with exponential backoff.
    async fn retry<T, F, Fut>(&self, context: RetryContext, mut operation: F) -> Result<T, ChainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let start = Instant::now();

            match operation().await {
                Ok(value) => {
                    self.metrics.record_success(start.elapsed());
                    context.log_success(attempt);
                    return Ok(value);
                }
                Err(err) => {
                    let elapsed = start.elapsed();
                    if matches!(err, ChainError::Timeout { .. }) {
                        self.metrics.record_timeout(elapsed);
                    } else {
                        self.metrics.record_failure(elapsed);
                    }

                    if !err.is_transient() {
                        context.log_rejected(&err);
                        return Err(err);
                    }
                    if attempt >= self.options.max_attempts {
                        context.log_exhausted(attempt, &err);
                        return Err(err);
                    }

                    let backoff = self.options.backoff_delay(attempt);
                    context.log_retry(attempt, backoff, &err);
                    self.metrics.record_retry();
                    sleep(backoff).await;
                }
            }
        }
    }

    async fn call<R>(&self, method: &'static str, params: ObjectParams) -> Result<R, ChainError>
    where
        R: DeserializeOwned,
    {
        timeout(self.options.request_timeout, self.client.request(method, params))
            .await
            .map_err(|_| ChainError::Timeout { method })?
            .map_err(|err| map_rpc_error(method, err))
    }

    fn poll_new_heights(&self, start_after: Height, shutdown: CancellationToken) -> HeightStream {
        struct PollState {
            client: CometRpcClient,
            next: Height,
            tip: Height,
            ticker: tokio::time::Interval,
            shutdown: CancellationToken,
        }

        let mut ticker = interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let state = PollState {
            client: self.clone(),
            next: start_after.saturating_add(1),
            tip: start_after,
            ticker,
            shutdown,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if state.next <= state.tip {
                    let height = state.next;
                    state.next += 1;
                    return Some((height, state));
                }

                tokio::select! {
                    _ = state.shutdown.cancelled() => return None,
                    _ = state.ticker.tick() => {}
                }

                match state.client.fetch_latest_height().await {
                    Ok(tip) if tip > state.tip => state.tip = tip,
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "failed to poll latest height"),
                }
            }
        })
        .boxed()
    }
}

impl ChainNode for CometRpcClient {
    fn latest_height(&self) -> ChainFuture<'_, Height> {
        Box::pin(self.fetch_latest_height())
    }

    fn get_block(&self, height: Height) -> ChainFuture<'_, RawBlock> {
        Box::pin(self.fetch_block(height))
    }

    fn get_transactions(&self, height: Height) -> ChainFuture<'_, Vec<Transaction>> {
        Box::pin(self.fetch_transactions(height))
    }

    fn get_genesis_chunk(&self, index: usize) -> ChainFuture<'_, GenesisChunk> {
        Box::pin(self.fetch_genesis_chunk(index))
    }

    fn subscribe_new_blocks(&self, shutdown: CancellationToken) -> ChainFuture<'_, HeightStream> {
        Box::pin(async move {
            let start = self.fetch_latest_height().await?;
            tracing::info!(start_after = start, "polling chain node for new blocks");
            Ok(self.poll_new_heights(start, shutdown))
        })
    }
}

fn object_params(entries: &[(&str, String)]) -> Result<ObjectParams, ChainError> {
    let mut params = ObjectParams::new();
    for (key, value) in entries {
        params
            .insert(key, value)
            .map_err(|err| ChainError::decode("params", err.to_string()))?;
    }
    Ok(params)
}

fn map_rpc_error(method: &'static str, err: JsonRpcError) -> ChainError {
    match err {
        JsonRpcError::Call(call) => {
            let data = call.data().map(|raw| raw.get().to_string()).unwrap_or_default();
            if let Some(height) = unavailable_height(&data) {
                return ChainError::HeightUnavailable { height };
            }
            let message = if data.is_empty() {
                call.message().to_string()
            } else {
                format!("{} ({data})", call.message())
            };
            ChainError::Rpc {
                method,
                code: call.code(),
                message,
            }
        }
        JsonRpcError::RequestTimeout => ChainError::Timeout { method },
        JsonRpcError::ParseError(err) => ChainError::decode(method, err.to_string()),
        other => ChainError::Transport {
            method,
            message: other.to_string(),
        },
    }
}

/// Extracts the requested height from CometBFT's "height N must be less than
/// or equal to ..." style messages.
fn unavailable_height(data: &str) -> Option<Height> {
    if !HEIGHT_NOT_AVAILABLE_MARKERS
        .iter()
        .any(|marker| data.contains(marker))
    {
        return None;
    }
    data.split_whitespace()
        .skip_while(|word| *word != "height")
        .nth(1)
        .and_then(|word| word.trim_matches(|c: char| !c.is_ascii_digit()).parse().ok())
}
