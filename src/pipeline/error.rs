use crate::chain::ChainError;
use crate::modules::ModuleError;

/// Failure of a single height; every variant ends with the height marked Errored.
///
/// Status store failures never surface here: the state machine logs them and
/// ingestion carries on.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] ChainError),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Module(#[from] ModuleError),
}

impl PipelineError {
    pub(crate) fn decode(message: impl Into<String>) -> Self {
        PipelineError::Decode(message.into())
    }
}
