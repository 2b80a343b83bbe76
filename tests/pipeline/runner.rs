use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{
        genesis_document, init_tracing, wait_until, InvocationLog, RecordingModule,
        RecordingPublisher,
    },
    mock_chain::MockChain,
};
use anyhow::Result;
use blockcrawler::modules::HandlerStage;
use blockcrawler::{
    CrawlerConfig, CrawlerConfigBuilder, MemoryStatusStore, ModuleRegistry, ProcessingStatus,
    Runner, GENESIS_HEIGHT,
};
use tokio::time::{sleep, timeout};

fn base_config() -> CrawlerConfigBuilder {
    CrawlerConfig::builder()
        .rpc_url("http://127.0.0.1:26657")
        .rpc_timeout(Duration::from_secs(2))
        .poll_interval(Duration::from_millis(20))
        .metrics_interval(Duration::from_millis(50))
}

fn all_processed(store: &MemoryStatusStore, heights: std::ops::RangeInclusive<i64>) -> bool {
    heights
        .into_iter()
        .all(|height| store.status(height) == Some(ProcessingStatus::Processed))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bounded_run_with_genesis_processes_every_height_once() -> Result<()> {
    init_tracing();
    let log = InvocationLog::default();
    let chain = Arc::new(MockChain::new(10));
    chain.set_genesis(&genesis_document("crawler-1"), 4);
    chain.add_blocks(1..=6, 2);
    let store = Arc::new(MemoryStatusStore::new());

    let config = base_config()
        .worker_count(3)
        .start_height(0)
        .stop_height(6)
        .process_genesis(true)
        .build()?;
    let registry = ModuleRegistry::new(vec![RecordingModule::new("indexer", &log)
        .genesis()
        .blocks()
        .transactions()
        .build()])?;
    let mut runner = Runner::new(config, chain.clone(), store.clone(), registry, RecordingPublisher::new());

    runner.start().await?;
    timeout(Duration::from_secs(10), runner.wait()).await?;
    runner.stop().await?;

    assert!(all_processed(&store, GENESIS_HEIGHT..=6));
    assert_eq!(store.len(), 7);
    assert_eq!(
        log.subjects_for("indexer", HandlerStage::Genesis),
        vec!["crawler-1".to_string()]
    );
    assert_eq!(
        log.heights_for("indexer", HandlerStage::Block),
        vec![1, 2, 3, 4, 5, 6]
    );
    assert_eq!(log.heights_for("indexer", HandlerStage::Transaction).len(), 12);
    assert_eq!(chain.block_calls(), 6);
    assert_eq!(runner.telemetry().snapshot().finished_heights(), 7);
    assert!(runner.liveness().is_live().await);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn live_mode_follows_the_tip() -> Result<()> {
    init_tracing();
    let log = InvocationLog::default();
    let chain = Arc::new(MockChain::new(3));
    chain.add_blocks(1..=8, 1);
    let store = Arc::new(MemoryStatusStore::new());

    let config = base_config().worker_count(2).start_height(1).build()?;
    let registry =
        ModuleRegistry::new(vec![RecordingModule::new("blocks", &log).blocks().build()])?;
    let mut runner = Runner::new(config, chain.clone(), store.clone(), registry, RecordingPublisher::new());

    runner.start().await?;
    wait_until(Duration::from_secs(5), "catch-up range", || {
        all_processed(&store, 1..=3)
    })
    .await?;

    chain.set_tip(6);
    wait_until(Duration::from_secs(5), "live heights", || {
        all_processed(&store, 1..=6)
    })
    .await?;

    runner.stop().await?;
    assert_eq!(log.heights_for("blocks", HandlerStage::Block), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(store.status(7), None);
    Ok(())
}

#[tokio::test]
async fn unreachable_publisher_fails_start() -> Result<()> {
    init_tracing();
    let chain = Arc::new(MockChain::new(3));
    let store = Arc::new(MemoryStatusStore::new());
    let config = base_config().worker_count(1).start_height(1).build()?;

    let mut runner = Runner::new(
        config,
        chain.clone(),
        store.clone(),
        ModuleRegistry::new(Vec::new())?,
        RecordingPublisher::unreachable(),
    );

    let err = runner.start().await.expect_err("publisher ping must fail");
    assert!(format!("{err:#}").contains("event publisher is unreachable"));
    assert_eq!(chain.total_calls(), 0);
    assert!(store.is_empty());
    Ok(())
}

#[tokio::test]
async fn unreadable_tip_fails_start() -> Result<()> {
    init_tracing();
    let chain = Arc::new(MockChain::new(3));
    chain.fail_latest_height();
    let store = Arc::new(MemoryStatusStore::new());
    let config = base_config().worker_count(1).start_height(1).build()?;

    let mut runner = Runner::new(
        config,
        chain,
        store.clone(),
        ModuleRegistry::new(Vec::new())?,
        RecordingPublisher::new(),
    );

    let err = runner.start().await.expect_err("latest height must fail");
    assert!(format!("{err:#}").contains("connection refused"));
    assert!(store.is_empty());
    // Stopping a runner that never started is a no-op.
    runner.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_lets_in_flight_heights_finish() -> Result<()> {
    init_tracing();
    let log = InvocationLog::default();
    let chain = Arc::new(MockChain::new(40));
    chain.add_blocks(1..=40, 1);
    chain.set_fetch_delay(Duration::from_millis(100));
    let store = Arc::new(MemoryStatusStore::new());

    let config = base_config().worker_count(4).start_height(1).build()?;
    let registry = ModuleRegistry::new(vec![RecordingModule::new("blocks", &log)
        .blocks()
        .transactions()
        .build()])?;
    let mut runner = Runner::new(config, chain.clone(), store.clone(), registry, RecordingPublisher::new());

    runner.start().await?;
    wait_until(Duration::from_secs(5), "first fetches", || chain.block_calls() >= 4).await?;
    sleep(Duration::from_millis(20)).await;

    timeout(Duration::from_secs(5), runner.stop()).await??;

    assert!(store.processing_heights().is_empty());
    assert!(!store.is_empty());
    assert!(store.len() < 40, "shutdown should interrupt the catch-up range");
    assert_eq!(
        log.heights_for("blocks", HandlerStage::Block).len(),
        store.len()
    );
    Ok(())
}
