use crate::error::ExecutorError;
use async_trait::async_trait;
use engine_core::{connectors::sink::FailureSink, counter::JobCounter};
use model::records::record::Record;
use std::error::Error;
use tracing::warn;

pub mod async_batch;
pub mod constant;
pub mod transactional;

/// Write strategy used by the copy pipeline for one partition.
///
/// Executors count what they settle themselves: `WRITE` (or `UNFLUSHED`),
/// `SKIPPED` for records that bind to nothing and `ERROR` for records whose
/// write failed.
#[async_trait]
pub trait UpsertExecutor: Send {
    async fn submit(&mut self, record: Record, counter: &JobCounter) -> Result<(), ExecutorError>;

    /// Writes whatever is still buffered and waits for every outstanding write.
    async fn finish(&mut self, counter: &JobCounter) -> Result<(), ExecutorError>;

    /// Abandons buffered records and waits for writes already dispatched.
    async fn abort(&mut self, counter: &JobCounter);

    /// Releases the executor's target resources.
    async fn close(&mut self) -> Result<(), ExecutorError>;
}

/// Sends `record` to both failure logs; sink errors are only logged.
pub(crate) fn report_failure(
    sink: Option<&dyn FailureSink>,
    record: &Record,
    error: &(dyn Error + Send + Sync + 'static),
) {
    let Some(sink) = sink else {
        return;
    };
    if let Err(e) = sink.log_failed_record(record, error) {
        warn!(key = %record.pk, error = %e, "Could not log failed record");
    }
    if let Err(e) = sink.log_failed_key(record, error) {
        warn!(key = %record.pk, error = %e, "Could not log failed key");
    }
}
