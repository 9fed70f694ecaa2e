use crate::{error::PipelineError, pipeline::PipelineContext};
use engine_core::{
    connectors::target::TargetPointReader,
    counter::{CounterType, JobCounter},
    partition::PartitionRange,
    rate_limiter::RateLimiter,
};
use futures::{StreamExt, stream::FuturesUnordered};
use model::{
    core::value::Value,
    execution::{
        run::RunStatus,
        validation::{ColumnDiff, ValidationOutcome, values_match},
    },
    records::{record::Record, row::RowData},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
enum ValidationFailure {
    #[error("{0}")]
    Mismatch(String),

    #[error("Record missing in target")]
    Missing,

    #[error("Lookup failed: {0}")]
    Lookup(String),
}

/// Reads a partition from the origin and checks every record against the
/// target by primary key, instead of writing it.
#[derive(Clone)]
pub struct ValidationPipeline {
    ctx: PipelineContext,
    target: Arc<dyn TargetPointReader>,
}

impl ValidationPipeline {
    pub fn new(ctx: PipelineContext, target: Arc<dyn TargetPointReader>) -> Self {
        Self { ctx, target }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub async fn run(&self, range: &PartitionRange) -> RunStatus {
        let counter = range.counter();
        let label = range.label();
        self.ctx
            .report(range, RunStatus::Started, &counter.snapshot())
            .await;
        info!(partition = %label, "Validation started");

        match self.validate(range, counter).await {
            Ok(()) => {
                counter.increment(CounterType::PartitionsPassed);
                let snapshot = counter.flush(self.ctx.metrics.as_ref(), &label);
                info!(partition = %label, counters = %snapshot, "Validation passed");
                self.ctx.report(range, RunStatus::Pass, &snapshot).await;
                RunStatus::Pass
            }
            Err(e) => {
                let reconciled = counter.reconcile_validation_errors();
                counter.increment(CounterType::PartitionsFailed);
                let snapshot = counter.flush(self.ctx.metrics.as_ref(), &label);
                error!(partition = %label, error = %e, reconciled, counters = %snapshot, "Validation failed");
                self.ctx.report(range, RunStatus::Fail, &snapshot).await;
                RunStatus::Fail
            }
        }
    }

    async fn validate(&self, range: &PartitionRange, counter: &JobCounter) -> Result<(), PipelineError> {
        let origin = &self.ctx.origin;
        let query = origin
            .bind(range.min(), range.max())?
            .with_fetch_size(usize::try_from(self.ctx.config.fetch_size).unwrap_or(usize::MAX));
        let mut rows = origin.execute(query).await?;

        let concurrency = self.ctx.config.lookup_concurrency.max(1);
        let mut lookups = FuturesUnordered::new();

        while let Some(row) = rows.next().await {
            let row = row?;
            for record in self.admit(row, counter).await {
                if lookups.len() >= concurrency {
                    if let Some((record, outcome)) = lookups.next().await {
                        self.settle(&record, &outcome, counter);
                    }
                }
                lookups.push(lookup(
                    Arc::clone(&self.target),
                    Arc::clone(&self.ctx.write_limiter),
                    record,
                ));
            }
        }

        while let Some((record, outcome)) = lookups.next().await {
            self.settle(&record, &outcome, counter);
        }
        Ok(())
    }

    /// Counts the origin row and expands it into the records to check.
    async fn admit(&self, row: RowData, counter: &JobCounter) -> Vec<Record> {
        self.ctx.read_limiter.acquire(1).await;
        counter.increment(CounterType::Read);

        if self.ctx.origin.should_filter(&row) {
            counter.increment(CounterType::Skipped);
            return Vec::new();
        }

        let records = self.ctx.keys.expand(&Arc::new(row));
        if records.is_empty() {
            counter.increment(CounterType::Skipped);
        }
        records
    }

    fn settle(&self, record: &Record, outcome: &ValidationOutcome, counter: &JobCounter) {
        match outcome {
            ValidationOutcome::Valid => counter.increment(CounterType::Valid),
            ValidationOutcome::Mismatched { .. } => {
                counter.increment(CounterType::Mismatch);
                let details = outcome.details();
                error!(key = %record.pk, details = %details, "Mismatch found");
                self.log_key(record, &ValidationFailure::Mismatch(details));
            }
            ValidationOutcome::Missing => {
                counter.increment(CounterType::Missing);
                error!(key = %record.pk, "Record missing in target");
                self.log_key(record, &ValidationFailure::Missing);
            }
            ValidationOutcome::Error { message } => {
                counter.increment(CounterType::Error);
                error!(key = %record.pk, error = %message, "Validation lookup failed");
                self.log_key(record, &ValidationFailure::Lookup(message.clone()));
            }
        }
    }

    fn log_key(&self, record: &Record, failure: &ValidationFailure) {
        if let Some(sink) = &self.ctx.failure_sink {
            if let Err(e) = sink.log_failed_key(record, failure) {
                warn!(key = %record.pk, error = %e, "Could not log failed key");
            }
        }
    }
}

/// Point lookup of one record, owning everything it touches so lookups can
/// run side by side.
async fn lookup(
    target: Arc<dyn TargetPointReader>,
    limiter: Arc<RateLimiter>,
    record: Record,
) -> (Record, ValidationOutcome) {
    limiter.acquire(1).await;
    let outcome = match target.get_record(&record.pk).await {
        Ok(None) => ValidationOutcome::Missing,
        Ok(Some(row)) => compare(&record.origin, &row),
        Err(e) => ValidationOutcome::Error {
            message: e.to_string(),
        },
    };
    (record, outcome)
}

/// Compares every origin column that the target row also carries.
pub fn compare(origin: &RowData, target: &RowData) -> ValidationOutcome {
    let diffs = origin
        .field_values
        .iter()
        .filter_map(|field| {
            let target_field = target.get(&field.name)?;
            let origin_value = field.value.clone().unwrap_or(Value::Null);
            let target_value = target_field.value.clone().unwrap_or(Value::Null);
            (!values_match(&origin_value, &target_value)).then(|| ColumnDiff {
                column: field.name.clone(),
                origin: origin_value,
                target: target_value,
            })
        })
        .collect::<Vec<_>>();

    if diffs.is_empty() {
        ValidationOutcome::Valid
    } else {
        ValidationOutcome::Mismatched { diffs }
    }
}
