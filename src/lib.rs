pub mod chain;
pub mod modules;
pub mod pipeline;
pub mod processor;
pub mod runtime;
pub mod status;
pub mod types;

pub use chain::{AddressCodec, ChainError, ChainFuture, ChainNode, CometRpcClient, HeightStream};
pub use modules::{
    BlockHandler, EventPublisher, GenesisHandler, HandlerContext, HandlerFuture, Module,
    ModuleError, ModuleRegistry, PublishError, PublishFuture, RawModule, TransactionHandler,
};
pub use pipeline::{HeightOutcome, HeightPipeline, HeightPipelineParams, PipelineError};
pub use processor::HeightQueue;
pub use runtime::config::{CrawlerConfig, CrawlerConfigBuilder, CrawlerConfigParams};
pub use runtime::fatal::FatalErrorHandler;
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use status::{
    BlockStateMachine, ClaimDecision, LivenessCheck, MemoryStatusStore, ProcessingStatus,
    StatusError, StatusStore,
};
pub use types::{BlockRecord, GenesisState, Height, Transaction, GENESIS_HEIGHT};
