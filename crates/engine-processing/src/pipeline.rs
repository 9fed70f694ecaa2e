use crate::config::PipelineConfig;
use engine_core::{
    connectors::{
        origin::{OriginReader, key_factory::KeyFactory},
        sink::{FailureSink, MetricsSink, RunTracker},
    },
    counter::{CounterSnapshot, CounterType},
    partition::PartitionRange,
    rate_limiter::RateLimiter,
};
use model::execution::run::RunStatus;
use std::{fmt, sync::Arc};
use tracing::{error, warn};

pub mod copy;
pub mod validate;

/// Collaborators shared by every partition of one job.
#[derive(Clone)]
pub struct PipelineContext {
    pub run_id: String,
    pub config: Arc<PipelineConfig>,
    pub origin: Arc<dyn OriginReader>,
    pub keys: Arc<KeyFactory>,
    pub read_limiter: Arc<RateLimiter>,
    pub write_limiter: Arc<RateLimiter>,
    pub metrics: Arc<dyn MetricsSink>,
    pub run_tracker: Option<Arc<dyn RunTracker>>,
    pub failure_sink: Option<Arc<dyn FailureSink>>,
}

impl PipelineContext {
    /// Builds the context with one read and one write limiter sized from
    /// `config`.
    pub fn new(
        run_id: impl Into<String>,
        config: PipelineConfig,
        origin: Arc<dyn OriginReader>,
        keys: KeyFactory,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let keys = match &config.explode_map {
            Some(explode) => keys.with_explode_map(explode.clone()),
            None => keys,
        };
        Self {
            run_id: run_id.into(),
            read_limiter: Arc::new(RateLimiter::new(config.read_rate)),
            write_limiter: Arc::new(RateLimiter::new(config.write_rate)),
            config: Arc::new(config),
            origin,
            keys: Arc::new(keys),
            metrics,
            run_tracker: None,
            failure_sink: None,
        }
    }

    pub fn with_run_tracker(mut self, tracker: Arc<dyn RunTracker>) -> Self {
        self.run_tracker = Some(tracker);
        self
    }

    pub fn with_failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.failure_sink = Some(sink);
        self
    }

    /// Reports the partition status; tracking failures never fail the partition.
    pub(crate) async fn report(
        &self,
        range: &PartitionRange,
        status: RunStatus,
        snapshot: &CounterSnapshot,
    ) {
        let Some(tracker) = &self.run_tracker else {
            return;
        };
        if let Err(e) = tracker
            .update_run(&self.run_id, range.min(), status, snapshot)
            .await
        {
            warn!(partition = %range, %status, error = %e, "Failed to update run status");
        }
    }

    /// Marks a partition FAIL without it having run, e.g. when its executor
    /// could not be created.
    pub(crate) async fn fail_partition(
        &self,
        range: &PartitionRange,
        cause: &(dyn fmt::Display + Sync),
    ) -> RunStatus {
        let counter = range.counter();
        counter.increment(CounterType::PartitionsFailed);
        let snapshot = counter.flush(self.metrics.as_ref(), &range.label());
        error!(partition = %range, error = %cause, counters = %snapshot, "Partition failed");
        self.report(range, RunStatus::Fail, &snapshot).await;
        RunStatus::Fail
    }
}
