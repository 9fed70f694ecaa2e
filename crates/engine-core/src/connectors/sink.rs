use crate::{counter::CounterSnapshot, error::SinkError};
use async_trait::async_trait;
use model::{execution::run::RunStatus, records::record::Record};
use num_bigint::BigInt;
use std::error::Error;

pub mod failed_records;

/// Persists the lifecycle of each partition of a run.
#[async_trait]
pub trait RunTracker: Send + Sync {
    async fn update_run(
        &self,
        run_id: &str,
        partition_key: &BigInt,
        status: RunStatus,
        snapshot: &CounterSnapshot,
    ) -> Result<(), SinkError>;
}

/// Receives records that could not be written or validated.
pub trait FailureSink: Send + Sync {
    /// Full origin payload, for replay.
    fn log_failed_record(
        &self,
        record: &Record,
        error: &(dyn Error + Send + Sync + 'static),
    ) -> Result<(), SinkError>;

    /// Primary key and error only.
    fn log_failed_key(
        &self,
        record: &Record,
        error: &(dyn Error + Send + Sync + 'static),
    ) -> Result<(), SinkError>;
}

/// Accepts the counters of a partition once it completes.
pub trait MetricsSink: Send + Sync {
    fn publish(&self, partition: &str, snapshot: &CounterSnapshot);
}
