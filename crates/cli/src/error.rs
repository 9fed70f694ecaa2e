use connectors::sql::base::error::DbError;
use engine_core::error::SinkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    /// SQL target connection, metadata or statement error.
    #[error("Target error: {0}")]
    Target(#[from] DbError),

    #[error("Run state error: {0}")]
    RunState(#[from] SinkError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Invalid token range: {0}")]
    InvalidRange(String),

    #[error("Invalid origin type: {0}")]
    InvalidOriginType(String),

    #[error("No target table given, pass --table")]
    MissingTable,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}
