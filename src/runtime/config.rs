use crate::runtime::telemetry;
use crate::types::Height;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_MAX_LAG_SECS: u64 = 60;
const DEFAULT_ACCOUNT_PREFIX: &str = "cosmos";
const DEFAULT_CONSENSUS_PREFIX: &str = "cosmosvalcons";

/// Runtime configuration for the crawler.
///
/// All instances must be constructed via [`CrawlerConfig::builder`] or [`CrawlerConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlerConfig {
    rpc_url: String,
    worker_count: usize,
    start_height: Height,
    stop_height: Option<Height>,
    recovery_mode: bool,
    reprocess_errored: bool,
    process_genesis: bool,
    process_new_blocks: bool,
    rpc_timeout: Duration,
    queue_capacity: usize,
    poll_interval: Duration,
    account_prefix: String,
    consensus_prefix: String,
    metrics_interval: Duration,
    max_lag: Duration,
}

pub struct CrawlerConfigParams {
    pub rpc_url: String,
    pub worker_count: usize,
    pub start_height: Height,
    pub stop_height: Option<Height>,
    pub recovery_mode: bool,
    pub reprocess_errored: bool,
    pub process_genesis: bool,
    pub process_new_blocks: bool,
    pub rpc_timeout: Duration,
    pub queue_capacity: usize,
    pub poll_interval: Duration,
    pub account_prefix: String,
    pub consensus_prefix: String,
    pub metrics_interval: Duration,
    pub max_lag: Duration,
}

impl CrawlerConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`CrawlerConfig::builder`] when most values use defaults.
    pub fn new(params: CrawlerConfigParams) -> Result<Self> {
        let CrawlerConfigParams {
            rpc_url,
            worker_count,
            start_height,
            stop_height,
            recovery_mode,
            reprocess_errored,
            process_genesis,
            process_new_blocks,
            rpc_timeout,
            queue_capacity,
            poll_interval,
            account_prefix,
            consensus_prefix,
            metrics_interval,
            max_lag,
        } = params;

        let config = Self {
            rpc_url: trimmed_string(rpc_url),
            worker_count,
            start_height,
            stop_height,
            recovery_mode,
            reprocess_errored,
            process_genesis,
            process_new_blocks,
            rpc_timeout,
            queue_capacity,
            poll_interval,
            account_prefix: trimmed_string(account_prefix),
            consensus_prefix: trimmed_string(consensus_prefix),
            metrics_interval,
            max_lag,
        };

        config.validate()?;
        Ok(config)
    }

    /// Full RPC URL (including scheme) of the chain node.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Number of concurrent height workers.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// First block height of the catch-up range.
    pub fn start_height(&self) -> Height {
        self.start_height
    }

    /// Last catch-up height; `None` means the tip observed at startup.
    pub fn stop_height(&self) -> Option<Height> {
        self.stop_height
    }

    /// Whether a panic while processing one height is contained to that height.
    pub fn recovery_mode(&self) -> bool {
        self.recovery_mode
    }

    /// Whether heights previously marked Errored may be claimed again.
    pub fn reprocess_errored(&self) -> bool {
        self.reprocess_errored
    }

    pub fn process_genesis(&self) -> bool {
        self.process_genesis
    }

    pub fn process_new_blocks(&self) -> bool {
        self.process_new_blocks
    }

    /// Per-call timeout for chain node requests.
    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Interval between tip polls in live mode.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn account_prefix(&self) -> &str {
        &self.account_prefix
    }

    pub fn consensus_prefix(&self) -> &str {
        &self.consensus_prefix
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Maximum age of the latest processed block before the crawler reports unhealthy.
    pub fn max_lag(&self) -> Duration {
        self.max_lag
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.rpc_url)?;

        if self.worker_count == 0 {
            bail!("worker_count must be greater than 0");
        }

        if self.start_height < 0 {
            bail!("start_height cannot be negative");
        }

        if let Some(stop_height) = self.stop_height {
            if stop_height < self.start_height {
                bail!(
                    "stop_height ({stop_height}) must not be below start_height ({})",
                    self.start_height
                );
            }
        }

        if self.rpc_timeout.is_zero() {
            bail!("rpc_timeout must be greater than 0");
        }

        if self.queue_capacity == 0 {
            bail!("queue_capacity must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        ensure_not_empty(&self.account_prefix, "account_prefix")?;
        ensure_not_empty(&self.consensus_prefix, "consensus_prefix")?;

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.max_lag.is_zero() {
            bail!("max_lag must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct CrawlerConfigBuilder {
    rpc_url: Option<String>,
    worker_count: Option<usize>,
    start_height: Option<Height>,
    stop_height: Option<Height>,
    recovery_mode: Option<bool>,
    reprocess_errored: Option<bool>,
    process_genesis: Option<bool>,
    process_new_blocks: Option<bool>,
    rpc_timeout: Option<Duration>,
    queue_capacity: Option<usize>,
    poll_interval: Option<Duration>,
    account_prefix: Option<String>,
    consensus_prefix: Option<String>,
    metrics_interval: Option<Duration>,
    max_lag: Option<Duration>,
}

impl CrawlerConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    pub fn start_height(mut self, height: Height) -> Self {
        self.start_height = Some(height);
        self
    }

    pub fn stop_height(mut self, height: Height) -> Self {
        self.stop_height = Some(height);
        self
    }

    pub fn recovery_mode(mut self, enabled: bool) -> Self {
        self.recovery_mode = Some(enabled);
        self
    }

    pub fn reprocess_errored(mut self, enabled: bool) -> Self {
        self.reprocess_errored = Some(enabled);
        self
    }

    pub fn process_genesis(mut self, enabled: bool) -> Self {
        self.process_genesis = Some(enabled);
        self
    }

    pub fn process_new_blocks(mut self, enabled: bool) -> Self {
        self.process_new_blocks = Some(enabled);
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn account_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.account_prefix = Some(prefix.into());
        self
    }

    pub fn consensus_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.consensus_prefix = Some(prefix.into());
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn max_lag(mut self, lag: Duration) -> Self {
        self.max_lag = Some(lag);
        self
    }

    pub fn build(self) -> Result<CrawlerConfig> {
        let params = CrawlerConfigParams {
            rpc_url: self.rpc_url.context("rpc_url is required")?,
            worker_count: self.worker_count.context("worker_count is required")?,
            start_height: self.start_height.context("start_height is required")?,
            stop_height: self.stop_height,
            recovery_mode: self.recovery_mode.unwrap_or(true),
            reprocess_errored: self.reprocess_errored.unwrap_or(false),
            process_genesis: self.process_genesis.unwrap_or(false),
            process_new_blocks: self.process_new_blocks.unwrap_or(true),
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            queue_capacity: self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            poll_interval: self
                .poll_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)),
            account_prefix: self
                .account_prefix
                .unwrap_or_else(|| DEFAULT_ACCOUNT_PREFIX.to_owned()),
            consensus_prefix: self
                .consensus_prefix
                .unwrap_or_else(|| DEFAULT_CONSENSUS_PREFIX.to_owned()),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            max_lag: self
                .max_lag
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_MAX_LAG_SECS)),
        };

        CrawlerConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("rpc_url must start with http:// or https://");
    }
    Ok(())
}
