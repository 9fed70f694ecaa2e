use crate::config::ConfigError;
use engine_core::error::{SinkError, SourceError, TargetError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Target error: {0}")]
    Target(#[from] TargetError),

    #[error("Batch of {size} records failed: {source}")]
    BatchFailed {
        size: usize,
        #[source]
        source: TargetError,
    },

    #[error("Write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Partition aborted before the record was written")]
    Aborted,

    #[error("Executor is closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Origin error: {0}")]
    Source(#[from] SourceError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Target error: {0}")]
    Target(#[from] TargetError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
