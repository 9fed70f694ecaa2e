use crate::{
    config::PipelineConfig,
    error::ExecutorError,
    upsert::{UpsertExecutor, constant::ConstantColumns, report_failure},
};
use async_trait::async_trait;
use connectors::sql::base::coercion::convert;
use engine_core::{
    connectors::{
        sink::FailureSink,
        target::{BatchStatement, SchemaProvider, TransactionalTarget},
    },
    counter::{CounterType, JobCounter},
    error::TargetError,
    rate_limiter::RateLimiter,
};
use model::{
    core::{data_type::BindType, value::Value},
    records::record::Record,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
struct ColumnBinding {
    name: String,
    bind_type: BindType,
    constant: Option<Value>,
}

/// Writes through one prepared upsert on a dedicated connection, committing
/// each driver batch as a single transaction.
///
/// A failed batch is rolled back as a whole and every record in it is
/// reported and counted as `ERROR`; later batches carry on.
pub struct TransactionalExecutor {
    statement: Box<dyn BatchStatement>,
    columns: Vec<ColumnBinding>,
    batch: Vec<Record>,
    batch_size: usize,
    write_limiter: Arc<RateLimiter>,
    failure_sink: Option<Arc<dyn FailureSink>>,
    closed: bool,
}

impl TransactionalExecutor {
    pub async fn prepare(
        target: &dyn TransactionalTarget,
        schema: &dyn SchemaProvider,
        config: &PipelineConfig,
        write_limiter: Arc<RateLimiter>,
    ) -> Result<Self, ExecutorError> {
        let sql = schema.upsert_sql()?;
        let constants = ConstantColumns::parse(&config.constant_columns, schema);

        let columns = schema
            .all_column_names()
            .into_iter()
            .map(|name| ColumnBinding {
                bind_type: schema.bind_type(&name).unwrap_or(BindType::Text),
                constant: constants.get(&name).cloned(),
                name,
            })
            .collect::<Vec<_>>();

        let mut statement = target.prepare(&sql).await?;
        if statement.parameter_count() != columns.len() {
            return Err(ExecutorError::Target(TargetError::Write(format!(
                "upsert expects {} parameters but {} has {} columns",
                statement.parameter_count(),
                schema.table_name(),
                columns.len()
            ))));
        }
        statement.set_auto_commit(false).await?;

        info!(
            table = %schema.table_name(),
            batch_size = config.batch_size,
            constants = constants.len(),
            "Prepared upsert statement"
        );
        debug!(sql = %sql, "Upsert SQL");

        Ok(Self {
            statement,
            columns,
            batch: Vec::with_capacity(config.batch_size),
            batch_size: config.batch_size.max(1),
            write_limiter,
            failure_sink: None,
            closed: false,
        })
    }

    pub fn with_failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.failure_sink = Some(sink);
        self
    }

    /// Records bound into the current, not yet executed, batch.
    pub fn buffered(&self) -> usize {
        self.batch.len()
    }

    fn add_to_batch(&mut self, record: &Record) -> Result<(), TargetError> {
        self.statement.clear_parameters();

        for (i, column) in self.columns.iter().enumerate() {
            let value = match &column.constant {
                Some(constant) => constant.clone(),
                None => {
                    let raw = record.origin.get_value(&column.name);
                    convert(
                        &raw,
                        record.origin.source_type(&column.name),
                        &column.bind_type,
                    )
                }
            };
            self.statement.bind_parameter(i + 1, value)?;
        }

        self.statement.add_to_batch()
    }

    /// Executes and commits the buffered batch. On failure the transaction is
    /// rolled back and every member is attributed as an error.
    async fn flush(&mut self, counter: &JobCounter) -> Result<(), ExecutorError> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let records = std::mem::take(&mut self.batch);
        let size = records.len();
        self.write_limiter
            .acquire(u32::try_from(size).unwrap_or(u32::MAX))
            .await;

        let outcome = match self.statement.execute_batch().await {
            Ok(_) => self.statement.commit().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                counter.increment_by(CounterType::Write, size as u64);
                debug!(size, "Committed batch");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.statement.rollback().await {
                    warn!(error = %rollback, "Rollback after failed batch failed");
                }
                error!(size, error = %e, "Batch failed and was rolled back");
                counter.increment_by(CounterType::Error, size as u64);
                for record in &records {
                    report_failure(self.failure_sink.as_deref(), record, &e);
                }
                Err(ExecutorError::BatchFailed { size, source: e })
            }
        }
    }
}

#[async_trait]
impl UpsertExecutor for TransactionalExecutor {
    async fn submit(&mut self, record: Record, counter: &JobCounter) -> Result<(), ExecutorError> {
        if self.closed {
            return Err(ExecutorError::Closed);
        }

        if let Err(e) = self.add_to_batch(&record) {
            error!(key = %record.pk, error = %e, "Failed to bind record");
            counter.increment(CounterType::Error);
            report_failure(self.failure_sink.as_deref(), &record, &e);
            return Ok(());
        }
        self.batch.push(record);

        if self.batch.len() >= self.batch_size {
            match self.flush(counter).await {
                // already attributed to its records
                Err(ExecutorError::BatchFailed { .. }) => {}
                other => other?,
            }
        }
        Ok(())
    }

    async fn finish(&mut self, counter: &JobCounter) -> Result<(), ExecutorError> {
        match self.flush(counter).await {
            Err(ExecutorError::BatchFailed { size, .. }) => {
                warn!(size, "Final batch of partition failed");
                Ok(())
            }
            other => other,
        }
    }

    async fn abort(&mut self, _counter: &JobCounter) {
        let abandoned = std::mem::take(&mut self.batch);
        if !abandoned.is_empty() {
            warn!(
                abandoned = abandoned.len(),
                "Dropping buffered records of failed partition"
            );
            for record in &abandoned {
                report_failure(self.failure_sink.as_deref(), record, &ExecutorError::Aborted);
            }
        }
        self.statement.clear_parameters();
        if let Err(e) = self.statement.rollback().await {
            warn!(error = %e, "Rollback of aborted partition failed");
        }
    }

    async fn close(&mut self) -> Result<(), ExecutorError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.statement.close().await?;
        Ok(())
    }
}
