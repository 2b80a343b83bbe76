//! Normalized chain records produced by the fetch stage and consumed by
//! handler modules.

pub mod block;
pub(crate) mod codec;
pub mod genesis;
pub mod transaction;

pub use block::{BlockRecord, CommitSignature, RawBlock, ValidatorPreCommit};
pub use genesis::{GenesisChunk, GenesisState};
pub use transaction::{Event, EventAttribute, LookupError, MessageLog, Transaction, TxMessage};

/// Block height. Signed to match the node's wire representation.
pub type Height = i64;

/// Height reserved for genesis ingestion; it never enters the block-fetch path.
pub const GENESIS_HEIGHT: Height = 0;
