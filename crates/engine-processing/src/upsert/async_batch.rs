use crate::{
    backpressure::BackpressureGate,
    batch::BatchAccumulator,
    config::PipelineConfig,
    error::ExecutorError,
    upsert::{UpsertExecutor, report_failure},
};
use async_trait::async_trait;
use engine_core::{
    connectors::{
        sink::FailureSink,
        target::{AsyncTargetWriter, BoundWrite, WriteBatch},
    },
    counter::{CounterType, JobCounter},
    rate_limiter::RateLimiter,
};
use model::records::record::Record;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};
use tracing::{debug, error, trace, warn};

struct PendingWrite {
    record: Record,
    write: BoundWrite,
}

/// Records handed to the writer whose batch has not completed yet.
///
/// A record stays in `UNFLUSHED` until its batch settles it. Promotion into
/// `WRITE` and settling of failed batches go through the same lock, so every
/// record ends up in exactly one of `WRITE` and `ERROR`.
#[derive(Default)]
struct Outstanding(Mutex<u64>);

impl Outstanding {
    fn dispatched(&self, records: u64) {
        *self.lock() += records;
    }

    fn completed(&self, records: u64, counter: &JobCounter, failed: bool) {
        let mut outstanding = self.lock();
        *outstanding = outstanding.saturating_sub(records);
        if failed {
            counter.settle_unflushed(CounterType::Error, records);
        }
    }

    /// Promotes every `UNFLUSHED` record that is no longer in flight.
    fn promote(&self, counter: &JobCounter) -> u64 {
        let outstanding = self.lock();
        let settled = counter
            .get(CounterType::Unflushed)
            .saturating_sub(*outstanding);
        counter.settle_unflushed(CounterType::Write, settled)
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Dispatches batches to a peer store without waiting for them.
///
/// Every dispatched batch runs as its own task, gated by a
/// [`BackpressureGate`]; the partition only waits for them in `finish` or
/// `abort`. Records of a failed batch are logged and counted as `ERROR`; the
/// partition itself carries on.
pub struct AsyncBatchExecutor {
    writer: Arc<dyn AsyncTargetWriter>,
    write_limiter: Arc<RateLimiter>,
    failure_sink: Option<Arc<dyn FailureSink>>,
    gate: BackpressureGate,
    accumulator: BatchAccumulator<PendingWrite>,
    batch_size: usize,
    fetch_size: u64,
    since_flush: u64,
    outstanding: Arc<Outstanding>,
    failed: Arc<AtomicU64>,
    dispatched: u64,
}

impl AsyncBatchExecutor {
    pub fn new(
        writer: Arc<dyn AsyncTargetWriter>,
        write_limiter: Arc<RateLimiter>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            writer,
            write_limiter,
            failure_sink: None,
            gate: BackpressureGate::new(config.max_pending_writes, config.backpressure.clone()),
            accumulator: BatchAccumulator::new(config.batch_size),
            batch_size: config.batch_size.max(1),
            fetch_size: config.fetch_size.max(1),
            since_flush: 0,
            outstanding: Arc::new(Outstanding::default()),
            failed: Arc::new(AtomicU64::new(0)),
            dispatched: 0,
        }
    }

    pub fn with_failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.failure_sink = Some(sink);
        self
    }

    /// Batches handed to the writer so far.
    pub fn dispatched_batches(&self) -> u64 {
        self.dispatched
    }

    pub fn peak_in_flight(&self) -> usize {
        self.gate.pending().peak_in_flight()
    }

    async fn flush(&mut self, counter: &JobCounter) {
        let residual = self.accumulator.take();
        self.dispatch(residual, counter).await;
    }

    async fn dispatch(&mut self, batch: Vec<PendingWrite>, counter: &JobCounter) {
        if batch.is_empty() {
            return;
        }

        let permit = self.gate.admit().await;
        let size = batch.len();
        self.write_limiter
            .acquire(u32::try_from(size).unwrap_or(u32::MAX))
            .await;

        let (records, writes): (Vec<Record>, Vec<BoundWrite>) =
            batch.into_iter().map(|p| (p.record, p.write)).unzip();
        let completion = self.writer.execute_async(WriteBatch::from(writes));

        self.outstanding.dispatched(size as u64);
        let outstanding = Arc::clone(&self.outstanding);
        let in_flight = self.gate.pending().begin();
        let failed = Arc::clone(&self.failed);
        let sink = self.failure_sink.clone();
        let counter = counter.clone();

        let handle = tokio::spawn(async move {
            // dropped in reverse: the in-flight count falls before the slot frees
            let _permit = permit;
            let _in_flight = in_flight;

            match completion.await {
                Ok(applied) => {
                    outstanding.completed(size as u64, &counter, false);
                    trace!(size, applied, "Write batch completed");
                }
                Err(e) => {
                    outstanding.completed(size as u64, &counter, true);
                    error!(size, error = %e, "Asynchronous write batch failed");
                    failed.fetch_add(size as u64, Ordering::Relaxed);
                    for record in &records {
                        report_failure(sink.as_deref(), record, &e);
                    }
                }
            }
        });

        self.gate.pending().track(handle);
        self.dispatched += 1;
        debug!(
            size,
            in_flight = self.gate.pending().in_flight(),
            "Dispatched write batch"
        );
    }

    async fn drain(&self) -> Result<(), ExecutorError> {
        let joined = self.gate.drain().await?;
        trace!(joined, "Drained outstanding writes");
        Ok(())
    }
}

#[async_trait]
impl UpsertExecutor for AsyncBatchExecutor {
    async fn submit(&mut self, record: Record, counter: &JobCounter) -> Result<(), ExecutorError> {
        let write = match self.writer.bind(&record) {
            Ok(Some(write)) => write,
            Ok(None) => {
                trace!(key = %record.pk, "Record binds to no write");
                counter.increment(CounterType::Skipped);
                return Ok(());
            }
            Err(e) => {
                error!(key = %record.pk, error = %e, "Failed to bind record");
                counter.increment(CounterType::Error);
                report_failure(self.failure_sink.as_deref(), &record, &e);
                return Ok(());
            }
        };

        // counted before dispatch so a fast completion always finds it
        counter.increment(CounterType::Unflushed);
        self.since_flush += 1;

        let pending = PendingWrite { record, write };
        if self.batch_size == 1 {
            self.dispatch(vec![pending], counter).await;
        } else if let Some(full) = self.accumulator.add(pending) {
            self.dispatch(full, counter).await;
        }

        if self.since_flush >= self.fetch_size {
            self.flush(counter).await;
            self.since_flush = 0;
            let promoted = self.outstanding.promote(counter);
            trace!(promoted, "Promoted unflushed writes");
        }
        Ok(())
    }

    async fn finish(&mut self, counter: &JobCounter) -> Result<(), ExecutorError> {
        self.flush(counter).await;
        self.drain().await?;
        self.outstanding.promote(counter);

        let failed = self.failed.swap(0, Ordering::AcqRel);
        if failed > 0 {
            warn!(failed, "Partition finished with failed asynchronous writes");
        }
        Ok(())
    }

    async fn abort(&mut self, counter: &JobCounter) {
        let abandoned = self.accumulator.take();
        if !abandoned.is_empty() {
            warn!(
                abandoned = abandoned.len(),
                "Dropping buffered writes of failed partition"
            );
            counter.settle_unflushed(CounterType::Error, abandoned.len() as u64);
            for pending in &abandoned {
                report_failure(
                    self.failure_sink.as_deref(),
                    &pending.record,
                    &ExecutorError::Aborted,
                );
            }
        }

        if let Err(e) = self.drain().await {
            warn!(error = %e, "Outstanding write task failed while aborting");
        }
        self.outstanding.promote(counter);
    }

    async fn close(&mut self) -> Result<(), ExecutorError> {
        self.drain().await
    }
}
