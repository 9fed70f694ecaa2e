use connectors::sql::base::error::DbError;
use thiserror::Error;

/// Failures raised while reading a partition from the origin store.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to bind range query [{min}, {max}): {message}")]
    Bind {
        min: String,
        max: String,
        message: String,
    },

    #[error("Origin query failed: {0}")]
    Query(String),

    #[error("Failed to read origin row: {0}")]
    Read(String),

    #[error("Origin reader error: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Failed to bind record {key}: {message}")]
    Bind { key: String, message: String },

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Point lookup failed: {0}")]
    Lookup(String),

    #[error("Statement is closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("State store error: {0}")]
    Store(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Failed to update run {run_id}: {message}")]
    RunUpdate { run_id: String, message: String },
}
