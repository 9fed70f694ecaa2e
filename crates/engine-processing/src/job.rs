use crate::{
    error::ExecutorError,
    pipeline::{PipelineContext, copy::CopyPipeline, validate::ValidationPipeline},
    upsert::UpsertExecutor,
};
use async_trait::async_trait;
use engine_core::{
    counter::CounterSnapshot,
    metrics::{JobMetrics, PerformanceSummary},
    partition::PartitionRange,
};
use model::execution::run::RunStatus;
use num_bigint::BigInt;
use std::{future::Future, path::PathBuf, sync::Arc};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{error, info, warn};

/// Creates the executor of one partition. Called once per partition, after
/// the partition was admitted to run.
#[async_trait]
pub trait ExecutorFactory: Send + Sync {
    async fn create(&self, range: &PartitionRange) -> Result<Box<dyn UpsertExecutor>, ExecutorError>;
}

pub enum JobMode {
    Copy {
        pipeline: CopyPipeline,
        executors: Arc<dyn ExecutorFactory>,
    },
    Validate(ValidationPipeline),
}

impl JobMode {
    fn context(&self) -> &PipelineContext {
        match self {
            JobMode::Copy { pipeline, .. } => pipeline.context(),
            JobMode::Validate(pipeline) => pipeline.context(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            JobMode::Copy { .. } => "copy",
            JobMode::Validate(_) => "validate",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionStatus {
    pub label: String,
    pub min: BigInt,
    pub status: RunStatus,
}

/// Outcome of a job: one status per partition, in the order the ranges were
/// given, and the job-wide counters.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub partitions: Vec<PartitionStatus>,
    pub totals: CounterSnapshot,
    pub summary: PerformanceSummary,
}

impl JobReport {
    pub fn passed(&self) -> usize {
        self.count(RunStatus::Pass)
    }

    pub fn failed(&self) -> usize {
        self.count(RunStatus::Fail)
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, status: RunStatus) -> usize {
        self.partitions
            .iter()
            .filter(|p| p.status == status)
            .count()
    }
}

/// Runs partition ranges with at most `parallelism` of them in flight.
///
/// The context of `mode` must publish to `metrics`; the report totals are read
/// from it. No partition outcome stops the job.
pub struct JobRunner {
    mode: JobMode,
    metrics: JobMetrics,
    summary_dir: Option<PathBuf>,
}

impl JobRunner {
    pub fn new(mode: JobMode, metrics: JobMetrics) -> Self {
        Self {
            mode,
            metrics,
            summary_dir: None,
        }
    }

    /// Writes the performance summary into `dir` once the job is done.
    pub fn with_summary_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.summary_dir = Some(dir.into());
        self
    }

    pub fn metrics(&self) -> &JobMetrics {
        &self.metrics
    }

    pub async fn run(&self, ranges: Vec<PartitionRange>) -> JobReport {
        let ctx = self.mode.context();
        let parallelism = ctx.config.parallelism.max(1);
        info!(
            run_id = %ctx.run_id,
            mode = self.mode.name(),
            partitions = ranges.len(),
            parallelism,
            "Job started"
        );

        let partitions = match &self.mode {
            JobMode::Copy {
                pipeline,
                executors,
            } => {
                execute(ranges, parallelism, ctx, |range| {
                    let pipeline = pipeline.clone();
                    let executors = Arc::clone(executors);
                    async move {
                        match executors.create(&range).await {
                            Ok(executor) => pipeline.run(&range, executor).await,
                            Err(e) => pipeline.context().fail_partition(&range, &e).await,
                        }
                    }
                })
                .await
            }
            JobMode::Validate(pipeline) => {
                execute(ranges, parallelism, ctx, |range| {
                    let pipeline = pipeline.clone();
                    async move { pipeline.run(&range).await }
                })
                .await
            }
        };

        let summary = self.metrics.summary();
        let report = JobReport {
            partitions,
            totals: summary.totals,
            summary,
        };

        info!(
            run_id = %ctx.run_id,
            passed = report.passed(),
            failed = report.failed(),
            counters = %report.totals,
            "Job finished"
        );
        info!("\n{}", report.summary.render());

        if let Some(dir) = &self.summary_dir {
            if let Err(e) = report.summary.write_to(dir) {
                warn!(dir = %dir.display(), error = %e, "Failed to write performance summary");
            }
        }
        report
    }
}

async fn execute<F, Fut>(
    ranges: Vec<PartitionRange>,
    parallelism: usize,
    ctx: &PipelineContext,
    run_partition: F,
) -> Vec<PartitionStatus>
where
    F: Fn(PartitionRange) -> Fut,
    Fut: Future<Output = RunStatus> + Send + 'static,
{
    let slots = Arc::new(Semaphore::new(parallelism));
    let mut tasks = JoinSet::new();

    for (index, range) in ranges.into_iter().enumerate() {
        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
            break;
        };
        let ctx = ctx.clone();
        let partition = run_partition(range.clone());

        tasks.spawn(async move {
            let _permit = permit;
            let status = match tokio::spawn(partition).await {
                Ok(status) => status,
                Err(e) => ctx.fail_partition(&range, &e).await,
            };
            (
                index,
                PartitionStatus {
                    label: range.label(),
                    min: range.min().clone(),
                    status,
                },
            )
        });
    }

    let mut statuses = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(status) => statuses.push(status),
            Err(e) => error!(error = %e, "Partition supervisor task failed"),
        }
    }

    statuses.sort_by_key(|(index, _)| *index);
    statuses.into_iter().map(|(_, status)| status).collect()
}
