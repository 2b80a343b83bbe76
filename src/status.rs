//! Persisted per-height processing status and the claim protocol built on it.

pub mod health;
pub mod machine;
pub mod memory;
pub mod store;

pub use health::LivenessCheck;
pub use machine::{BlockStateMachine, ClaimDecision};
pub use memory::MemoryStatusStore;
pub use store::{ClaimOutcome, ProcessingStatus, StatusError, StatusFuture, StatusRecord, StatusStore};
