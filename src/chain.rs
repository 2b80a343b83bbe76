//! Chain-node access: the `ChainNode` collaborator trait consumed by the
//! pipeline and a CometBFT JSON-RPC implementation with retry, metrics, and
//! Cosmos transaction decoding.

pub mod client;
pub mod decode;
pub mod metrics;
pub mod node;
pub mod options;
pub mod payload;
pub(crate) mod retry;

pub use client::CometRpcClient;
pub use decode::AddressCodec;
pub use metrics::RpcMetricsSnapshot;
pub use node::{ChainError, ChainFuture, ChainNode, HeightStream};
pub use options::RpcClientOptions;
