//! Runtime glue that wires config, telemetry, fatal-error capture, and runner
//! orchestration.

pub mod config;
pub mod fatal;
pub mod runner;
pub mod telemetry;
