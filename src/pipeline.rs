//! Per-height ingestion: claim, concurrent fetch, genesis reassembly, module
//! fan-out, and the final status transition.

pub mod error;
pub mod fetch;
pub mod genesis;
pub mod height;

pub use error::PipelineError;
pub use fetch::{dispatch_block_data, fetch_block_data, BlockData};
pub use genesis::GenesisAssembler;
pub use height::{HeightOutcome, HeightPipeline, HeightPipelineParams};
