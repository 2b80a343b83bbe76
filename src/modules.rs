//! Handler modules: capability traits, the registry that classifies modules
//! once at construction, and the event publisher boundary modules write to.

pub mod handler;
pub mod publisher;
pub mod raw;
pub mod registry;

pub use handler::{
    BlockHandler, GenesisHandler, HandlerContext, HandlerFuture, HandlerStage, Module, ModuleError,
    TransactionHandler,
};
pub use publisher::{EventPublisher, PublishError, PublishFuture};
pub use raw::RawModule;
pub use registry::{GenesisReport, ModuleRegistry, RegistryError};
