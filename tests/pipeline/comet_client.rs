use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{genesis_document, init_tracing, RecordingPublisher},
    mock_comet::{CometFixture, MockCometServer},
};
use anyhow::Result;
use blockcrawler::chain::RpcClientOptions;
use blockcrawler::pipeline::{fetch_block_data, GenesisAssembler};
use blockcrawler::{
    AddressCodec, ChainError, ChainNode, CometRpcClient, CrawlerConfig, MemoryStatusStore,
    Module, ModuleRegistry, ProcessingStatus, RawModule, Runner,
};
use tokio::time::timeout;

fn client_for(server: &MockCometServer, options: RpcClientOptions) -> Result<CometRpcClient> {
    let addresses = AddressCodec::new("cosmos", "cosmosvalcons")?;
    CometRpcClient::with_options(server.url(), addresses, options)
}

fn fast_options() -> RpcClientOptions {
    RpcClientOptions {
        request_timeout: Duration::from_secs(2),
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        ..RpcClientOptions::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn block_and_transactions_are_decoded_in_block_order() -> Result<()> {
    init_tracing();
    let fixture = CometFixture::new(12, &["first", "second", "third"]);
    let expected_hashes = fixture.tx_hashes();
    let server = MockCometServer::start(fixture).await?;
    let client = client_for(&server, fast_options())?;

    let data = fetch_block_data(&client, 12, Duration::from_secs(2)).await?;

    assert_eq!(data.block.height(), 12);
    assert_eq!(data.block.tx_num(), 3);
    assert_eq!(data.block.total_gas(), 3 * 51_000);
    assert!(data.block.proposer_address().starts_with("cosmosvalcons1"));
    assert_eq!(data.block.validator_precommits().len(), 1);

    let hashes: Vec<_> = data.transactions.iter().map(|tx| tx.hash.clone()).collect();
    assert_eq!(hashes, expected_hashes);
    let memos: Vec<_> = data.transactions.iter().map(|tx| tx.memo.as_str()).collect();
    assert_eq!(memos, vec!["first", "second", "third"]);

    let tx = &data.transactions[0];
    assert!(tx.signer.starts_with("cosmos1"), "unexpected signer {}", tx.signer);
    assert_eq!(tx.messages[0].type_url, "/cosmos.bank.v1beta1.MsgSend");
    assert_eq!(tx.logs.len(), 1);
    assert_eq!(tx.gas_wanted, 200_000);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn status_is_retried_while_the_node_starts() -> Result<()> {
    init_tracing();
    let server =
        MockCometServer::start(CometFixture::new(40, &[]).with_failing_status_requests(2)).await?;
    let client = client_for(&server, fast_options())?;

    let height = client.latest_height().await?;

    assert_eq!(height, 40);
    assert!(client.metrics().total_retries >= 1);
    assert_eq!(server.requests(), 3);
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transaction_search_walks_every_page() -> Result<()> {
    init_tracing();
    let fixture = CometFixture::new(7, &["a", "b", "c", "d"]);
    let server = MockCometServer::start(fixture).await?;
    let client = client_for(
        &server,
        RpcClientOptions {
            tx_page_size: 1,
            ..fast_options()
        },
    )?;

    let transactions = client.get_transactions(7).await?;

    assert_eq!(transactions.len(), 4);
    assert!(transactions.iter().all(|tx| tx.height == 7));
    assert_eq!(server.requests(), 4);
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn genesis_is_reassembled_over_rpc() -> Result<()> {
    init_tracing();
    let document = genesis_document("comet-genesis");
    let fixture = CometFixture::new(1, &[]).with_genesis(&document, 3);
    let server = MockCometServer::start(fixture).await?;
    let client = client_for(&server, fast_options())?;

    let assembler = GenesisAssembler::new(Arc::new(client), Duration::from_secs(2));
    let genesis = assembler.fetch().await?;

    assert_eq!(genesis.chain_id, "comet-genesis");
    assert_eq!(genesis.initial_height, 1);
    assert!(genesis.module("bank").is_some());
    assert!(genesis.module("staking").is_some());
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn future_height_maps_to_unavailable() -> Result<()> {
    init_tracing();
    let server = MockCometServer::start(CometFixture::new(5, &[])).await?;
    let client = client_for(&server, fast_options())?;

    let err = client.get_block(9).await.expect_err("height 9 is above the tip");

    assert_eq!(err, ChainError::HeightUnavailable { height: 9 });
    assert!(!err.is_transient());
    assert_eq!(server.requests(), 1);
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connected_runner_publishes_raw_records() -> Result<()> {
    init_tracing();
    let server = MockCometServer::start(CometFixture::new(21, &["x", "y"])).await?;
    let publisher = RecordingPublisher::new();
    let store = Arc::new(MemoryStatusStore::new());

    let config = CrawlerConfig::builder()
        .rpc_url(server.url())
        .worker_count(2)
        .start_height(21)
        .stop_height(21)
        .rpc_timeout(Duration::from_secs(2))
        .build()?;
    let raw: Arc<dyn Module> = Arc::new(RawModule::new(publisher.clone()));
    let registry = ModuleRegistry::new(vec![raw])?;
    let mut runner = Runner::connect(config, store.clone(), registry, publisher.clone())?;

    runner.start().await?;
    timeout(Duration::from_secs(10), runner.wait()).await?;
    runner.stop().await?;

    assert_eq!(store.status(21), Some(ProcessingStatus::Processed));
    let blocks = publisher.payloads("raw_block");
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0]["height"], 21);
    assert_eq!(blocks[0]["tx_num"], 2);
    assert_eq!(publisher.payloads("raw_transaction").len(), 2);
    server.shutdown().await;
    Ok(())
}
