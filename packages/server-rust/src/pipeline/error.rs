use rofilter_core::ProcessorError;

/// Errors raised by the filtering stage's lifecycle and consumer loop.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("stage already started")]
    AlreadyStarted,
    #[error("stage is shut down")]
    ShutDown,
    #[error("failed to spawn stage thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("downstream processor failed: {0}")]
    Downstream(#[from] ProcessorError),
    #[error("panic while dispatching request: {0}")]
    Panicked(String),
}
