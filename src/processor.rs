//! Concurrency around the per-height pipeline: the shared height queue, the
//! dispatcher that fills it, and the worker pool that drains it.

pub mod dispatcher;
pub mod queue;
pub mod worker;
pub mod worker_pool;

pub use queue::{HeightQueue, QueueClosed};
