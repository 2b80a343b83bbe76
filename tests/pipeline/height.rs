use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, InvocationLog, OfflineStatusStore, RecordingModule},
    mock_chain::MockChain,
};
use blockcrawler::modules::HandlerStage;
use blockcrawler::status::StatusRecord;
use blockcrawler::{
    BlockStateMachine, ClaimDecision, HeightOutcome, HeightPipeline, HeightPipelineParams,
    MemoryStatusStore, Module, ModuleRegistry, ProcessingStatus, Telemetry,
};

struct Harness {
    chain: Arc<MockChain>,
    store: Arc<MemoryStatusStore>,
    telemetry: Arc<Telemetry>,
    pipeline: HeightPipeline,
}

fn harness(chain: MockChain, modules: Vec<Arc<dyn Module>>, reprocess_errored: bool) -> Harness {
    init_tracing();
    let chain = Arc::new(chain);
    let store = Arc::new(MemoryStatusStore::new());
    let telemetry = Arc::new(Telemetry::default());
    let registry = ModuleRegistry::new(modules).expect("modules register");

    let pipeline = HeightPipeline::new(HeightPipelineParams {
        chain: chain.clone(),
        machine: BlockStateMachine::new(store.clone(), reprocess_errored),
        registry: Arc::new(registry),
        telemetry: telemetry.clone(),
        rpc_timeout: Duration::from_secs(2),
    });

    Harness {
        chain,
        store,
        telemetry,
        pipeline,
    }
}

#[tokio::test]
async fn fresh_height_reaches_every_capable_module() {
    let log = InvocationLog::default();
    let chain = MockChain::new(100);
    chain.add_block(100, 1);

    let h = harness(
        chain,
        vec![
            RecordingModule::new("blocks-a", &log).blocks().build(),
            RecordingModule::new("blocks-b", &log).blocks().build(),
            RecordingModule::new("txs-a", &log).transactions().build(),
            RecordingModule::new("txs-b", &log).transactions().build(),
            RecordingModule::new("txs-c", &log).transactions().build(),
        ],
        false,
    );

    let outcome = h.pipeline.process(100, 0).await;

    assert_eq!(outcome, HeightOutcome::Processed);
    assert_eq!(h.store.status(100), Some(ProcessingStatus::Processed));
    assert_eq!(log.len(), 5);
    assert_eq!(h.telemetry.snapshot().processed_heights, 1);
}

#[tokio::test]
async fn processed_height_is_not_fetched_or_dispatched_again() {
    let log = InvocationLog::default();
    let chain = MockChain::new(100);
    chain.add_block(100, 2);

    let h = harness(
        chain,
        vec![RecordingModule::new("all", &log).blocks().transactions().build()],
        false,
    );

    assert_eq!(h.pipeline.process(100, 0).await, HeightOutcome::Processed);
    let calls_after_first = h.chain.total_calls();
    let invocations_after_first = log.len();

    let second = h.pipeline.process(100, 1).await;

    assert_eq!(second, HeightOutcome::Skipped(ClaimDecision::SkipProcessed));
    assert_eq!(h.chain.total_calls(), calls_after_first);
    assert_eq!(log.len(), invocations_after_first);
}

#[tokio::test]
async fn already_processed_height_issues_no_calls() {
    let log = InvocationLog::default();
    let chain = MockChain::new(60);
    chain.add_block(50, 3);

    let h = harness(
        chain,
        vec![RecordingModule::new("all", &log).blocks().transactions().build()],
        false,
    );
    h.store
        .insert(50, StatusRecord::new(ProcessingStatus::Processed));

    let outcome = h.pipeline.process(50, 0).await;

    assert_eq!(outcome, HeightOutcome::Skipped(ClaimDecision::SkipProcessed));
    assert_eq!(h.chain.total_calls(), 0);
    assert_eq!(log.len(), 0);
    assert_eq!(h.telemetry.snapshot().skipped_heights, 1);
}

#[tokio::test]
async fn transaction_fetch_failure_marks_height_errored() {
    let log = InvocationLog::default();
    let chain = MockChain::new(10);
    chain.add_block(7, 2);
    chain.fail_transactions_at(7);

    let h = harness(
        chain,
        vec![RecordingModule::new("all", &log).blocks().transactions().build()],
        false,
    );

    let outcome = h.pipeline.process(7, 0).await;

    assert_eq!(outcome, HeightOutcome::Errored);
    let record = h.store.record(7).expect("status row exists");
    assert_eq!(record.status, ProcessingStatus::Errored);
    assert!(record
        .message
        .as_deref()
        .is_some_and(|message| message.contains("tx index unavailable")));
    assert_eq!(log.len(), 0, "no module may see a partially fetched height");
    assert_eq!(h.telemetry.snapshot().fetch_errors, 1);
}

#[tokio::test]
async fn transaction_fan_out_stops_at_the_failing_module() {
    let log = InvocationLog::default();
    let chain = MockChain::new(10);
    chain.add_block(9, 1);

    let h = harness(
        chain,
        vec![
            RecordingModule::new("A", &log).transactions().build(),
            RecordingModule::new("B", &log)
                .transactions()
                .failing_on(HandlerStage::Transaction)
                .build(),
            RecordingModule::new("C", &log).transactions().build(),
        ],
        false,
    );

    let outcome = h.pipeline.process(9, 0).await;

    assert_eq!(outcome, HeightOutcome::Errored);
    assert_eq!(log.modules_for(HandlerStage::Transaction), vec!["A", "B"]);
    let message = h.store.record(9).and_then(|record| record.message).unwrap();
    assert!(message.contains("B rejected"), "unexpected message {message}");
}

#[tokio::test]
async fn block_failure_takes_precedence_over_transaction_failure() {
    let log = InvocationLog::default();
    let chain = MockChain::new(10);
    chain.add_block(4, 1);

    let h = harness(
        chain,
        vec![
            RecordingModule::new("block-sink", &log)
                .blocks()
                .failing_on(HandlerStage::Block)
                .build(),
            RecordingModule::new("tx-sink", &log)
                .transactions()
                .failing_on(HandlerStage::Transaction)
                .build(),
        ],
        false,
    );

    assert_eq!(h.pipeline.process(4, 0).await, HeightOutcome::Errored);
    let message = h.store.record(4).and_then(|record| record.message).unwrap();
    assert!(message.contains("block-sink"), "unexpected message {message}");
}

#[tokio::test]
async fn transactions_reach_modules_in_block_order() {
    let log = InvocationLog::default();
    let chain = MockChain::new(20);
    let hashes = chain.add_block(20, 4);

    let h = harness(
        chain,
        vec![
            RecordingModule::new("blocks", &log).blocks().build(),
            RecordingModule::new("txs", &log).transactions().build(),
        ],
        false,
    );

    assert_eq!(h.pipeline.process(20, 0).await, HeightOutcome::Processed);
    assert_eq!(log.subjects_for("txs", HandlerStage::Transaction), hashes);
    assert_eq!(
        log.subjects_for("blocks", HandlerStage::Block),
        vec!["BLOCK00000020".to_string()]
    );
}

#[tokio::test]
async fn errored_height_is_skipped_unless_reprocessing() {
    let log = InvocationLog::default();
    let chain = MockChain::new(10);
    chain.add_block(3, 1);
    let skipping = harness(
        chain,
        vec![RecordingModule::new("all", &log).blocks().transactions().build()],
        false,
    );
    skipping.store.insert(3, StatusRecord::errored("earlier failure"));

    assert_eq!(
        skipping.pipeline.process(3, 0).await,
        HeightOutcome::Skipped(ClaimDecision::SkipErrored)
    );
    assert_eq!(skipping.chain.total_calls(), 0);

    let chain = MockChain::new(10);
    chain.add_block(3, 1);
    let reprocessing = harness(
        chain,
        vec![RecordingModule::new("all", &log).blocks().transactions().build()],
        true,
    );
    reprocessing
        .store
        .insert(3, StatusRecord::errored("earlier failure"));

    assert_eq!(
        reprocessing.pipeline.process(3, 0).await,
        HeightOutcome::Processed
    );
    assert_eq!(
        reprocessing.store.status(3),
        Some(ProcessingStatus::Processed)
    );
}

#[tokio::test]
async fn unreachable_status_store_does_not_block_ingestion() {
    init_tracing();
    let log = InvocationLog::default();
    let chain = Arc::new(MockChain::new(100));
    chain.add_block(100, 2);
    let store = Arc::new(OfflineStatusStore::default());
    let telemetry = Arc::new(Telemetry::default());

    let registry = ModuleRegistry::new(vec![
        RecordingModule::new("blocks", &log).blocks().build(),
        RecordingModule::new("txs", &log).transactions().build(),
    ])
    .expect("modules register");
    let pipeline = HeightPipeline::new(HeightPipelineParams {
        chain: chain.clone(),
        machine: BlockStateMachine::new(store.clone(), false),
        registry: Arc::new(registry),
        telemetry: telemetry.clone(),
        rpc_timeout: Duration::from_secs(2),
    });

    let outcome = pipeline.process(100, 0).await;

    assert_eq!(outcome, HeightOutcome::Processed);
    assert_eq!(log.heights_for("blocks", HandlerStage::Block), vec![100]);
    assert_eq!(log.subjects_for("txs", HandlerStage::Transaction).len(), 2);
    assert_eq!(chain.block_calls(), 1);
    // One failed claim and one failed finalize.
    assert_eq!(store.attempts(), 2);
    assert_eq!(telemetry.snapshot().processed_heights, 1);
}
