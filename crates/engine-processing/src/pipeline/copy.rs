use crate::{
    error::PipelineError,
    pipeline::PipelineContext,
    upsert::{UpsertExecutor, report_failure},
};
use engine_core::{
    connectors::target::TargetPointReader,
    counter::{CounterType, JobCounter},
    partition::PartitionRange,
};
use futures::StreamExt;
use model::{execution::run::RunStatus, records::record::Record};
use std::sync::Arc;
use tracing::{error, info, trace};

/// Copies one partition range from the origin to the target.
///
/// Whatever goes wrong inside a partition ends as a `FAIL` status with
/// reconciled counters; it is never returned to the caller.
#[derive(Clone)]
pub struct CopyPipeline {
    ctx: PipelineContext,
    point_reader: Option<Arc<dyn TargetPointReader>>,
}

impl CopyPipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            point_reader: None,
        }
    }

    /// Target reads used to merge counter columns before writing.
    pub fn with_point_reader(mut self, reader: Arc<dyn TargetPointReader>) -> Self {
        self.point_reader = Some(reader);
        self
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub async fn run(
        &self,
        range: &PartitionRange,
        mut executor: Box<dyn UpsertExecutor>,
    ) -> RunStatus {
        let counter = range.counter();
        let label = range.label();
        self.ctx
            .report(range, RunStatus::Started, &counter.snapshot())
            .await;
        info!(partition = %label, "Partition started");

        let status = match self.copy(range, executor.as_mut(), counter).await {
            Ok(()) => {
                counter.promote_unflushed();
                counter.increment(CounterType::PartitionsPassed);
                let snapshot = counter.flush(self.ctx.metrics.as_ref(), &label);
                info!(partition = %label, counters = %snapshot, "Partition passed");
                self.ctx.report(range, RunStatus::Pass, &snapshot).await;
                RunStatus::Pass
            }
            Err(e) => {
                executor.abort(counter).await;
                let reconciled = counter.reconcile_copy_errors();
                counter.increment(CounterType::PartitionsFailed);
                let snapshot = counter.flush(self.ctx.metrics.as_ref(), &label);
                error!(partition = %label, error = %e, reconciled, counters = %snapshot, "Partition failed");
                self.ctx.report(range, RunStatus::Fail, &snapshot).await;
                RunStatus::Fail
            }
        };

        if let Err(e) = executor.close().await {
            error!(partition = %label, error = %e, "Failed to close executor");
        }
        status
    }

    async fn copy(
        &self,
        range: &PartitionRange,
        executor: &mut dyn UpsertExecutor,
        counter: &JobCounter,
    ) -> Result<(), PipelineError> {
        let origin = &self.ctx.origin;
        let query = origin
            .bind(range.min(), range.max())?
            .with_fetch_size(usize::try_from(self.ctx.config.fetch_size).unwrap_or(usize::MAX));
        let mut rows = origin.execute(query).await?;

        while let Some(row) = rows.next().await {
            let row = row?;
            self.ctx.read_limiter.acquire(1).await;
            counter.increment(CounterType::Read);

            if origin.should_filter(&row) {
                counter.increment(CounterType::Skipped);
                continue;
            }

            let records = self.ctx.keys.expand(&Arc::new(row));
            if records.is_empty() {
                trace!("Row has no valid target record");
                counter.increment(CounterType::Skipped);
                continue;
            }

            for record in records {
                if let Some(record) = self.merge_target(record, counter).await {
                    executor.submit(record, counter).await?;
                }
            }
        }

        executor.finish(counter).await?;
        Ok(())
    }

    /// Attaches the current target row for counter tables. A failed lookup
    /// settles the record as an error.
    async fn merge_target(&self, record: Record, counter: &JobCounter) -> Option<Record> {
        let reader = match (&self.point_reader, self.ctx.config.counter_table) {
            (Some(reader), true) => reader,
            _ => return Some(record),
        };

        self.ctx.write_limiter.acquire(1).await;
        match reader.get_record(&record.pk).await {
            Ok(target) => Some(record.with_target(target)),
            Err(e) => {
                error!(key = %record.pk, error = %e, "Counter lookup failed");
                counter.increment(CounterType::Error);
                report_failure(self.ctx.failure_sink.as_deref(), &record, &e);
                None
            }
        }
    }
}
