use super::mocks::{Harness, MemoryStore, MockOrigin, MockSqlTarget, MockWriter, pk, users_table};
use crate::{
    config::{BackpressureConfig, BackpressureMode, PipelineConfig},
    pipeline::copy::CopyPipeline,
    upsert::{UpsertExecutor, async_batch::AsyncBatchExecutor, transactional::TransactionalExecutor},
};
use engine_core::{counter::CounterType, partition::PartitionRange};
use model::{core::value::Value, execution::run::RunStatus};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tracing_test::traced_test;

fn async_executor(harness: &Harness, writer: Arc<MockWriter>) -> Box<dyn UpsertExecutor> {
    Box::new(
        AsyncBatchExecutor::new(
            writer,
            Arc::clone(&harness.ctx.write_limiter),
            &harness.ctx.config,
        )
        .with_failure_sink(harness.failures.clone()),
    )
}

async fn sql_executor(harness: &Harness, target: &MockSqlTarget) -> Box<dyn UpsertExecutor> {
    let table = users_table();
    Box::new(
        TransactionalExecutor::prepare(
            target,
            &table,
            &harness.ctx.config,
            Arc::clone(&harness.ctx.write_limiter),
        )
        .await
        .unwrap()
        .with_failure_sink(harness.failures.clone()),
    )
}

#[tokio::test]
#[traced_test]
async fn async_copy_accounts_for_every_row() {
    let config = PipelineConfig::default()
        .with_batch_size(50)
        .with_fetch_size(200);
    let harness = Harness::new(MockOrigin::default(), config);
    let writer = Arc::new(MockWriter::new(MemoryStore::default()));
    let pipeline = CopyPipeline::new(harness.ctx.clone());
    let range = PartitionRange::new(0, 250);

    let status = pipeline
        .run(&range, async_executor(&harness, writer.clone()))
        .await;

    assert_eq!(status, RunStatus::Pass);
    assert_eq!(writer.batches(), 5);
    assert_eq!(writer.store.len(), 250);

    let snapshot = range.counter().snapshot();
    assert_eq!(snapshot.get(CounterType::Read), 250);
    assert_eq!(snapshot.get(CounterType::Write), 250);
    assert_eq!(snapshot.get(CounterType::Unflushed), 0);
    assert_eq!(snapshot.get(CounterType::Error), 0);
    assert!(snapshot.is_conserved());

    assert_eq!(
        harness.tracker.statuses(),
        vec![RunStatus::Started, RunStatus::Pass]
    );
    assert_eq!(harness.metrics.partition(&range.label()), Some(snapshot));
    assert!(logs_contain("Partition passed"));
}

#[tokio::test]
async fn unbindable_and_filtered_rows_are_skipped() {
    let origin = MockOrigin {
        filtered: HashSet::from([3, 4]),
        ..MockOrigin::default()
    };
    let harness = Harness::new(origin, PipelineConfig::default().with_batch_size(10));
    let writer = Arc::new(MockWriter {
        unbound: HashSet::from([7]),
        ..MockWriter::default()
    });
    let range = PartitionRange::new(0, 100);

    let status = CopyPipeline::new(harness.ctx.clone())
        .run(&range, async_executor(&harness, writer.clone()))
        .await;

    let snapshot = range.counter().snapshot();
    assert_eq!(status, RunStatus::Pass);
    assert_eq!(snapshot.get(CounterType::Read), 100);
    assert_eq!(snapshot.get(CounterType::Skipped), 3);
    assert_eq!(snapshot.get(CounterType::Write), 97);
    assert!(snapshot.is_conserved());
    assert!(writer.store.get(&pk(7)).is_none());
    assert!(writer.store.get(&pk(3)).is_none());
    assert!(writer.store.get(&pk(8)).is_some());
}

#[tokio::test]
async fn single_record_batches_dispatch_per_record() {
    let harness = Harness::new(MockOrigin::default(), PipelineConfig::default().with_batch_size(1));
    let writer = Arc::new(MockWriter::default());
    let range = PartitionRange::new(10, 30);

    let status = CopyPipeline::new(harness.ctx.clone())
        .run(&range, async_executor(&harness, writer.clone()))
        .await;

    assert_eq!(status, RunStatus::Pass);
    assert_eq!(writer.batches(), 20);
    assert_eq!(range.counter().get(CounterType::Write), 20);
}

#[tokio::test]
async fn unbindable_row_among_full_batches_is_skipped() {
    let config = PipelineConfig::default()
        .with_batch_size(50)
        .with_fetch_size(200);
    let harness = Harness::new(MockOrigin::default(), config);
    let writer = Arc::new(MockWriter {
        unbound: HashSet::from([17]),
        ..MockWriter::default()
    });
    let range = PartitionRange::new(0, 250);

    let status = CopyPipeline::new(harness.ctx.clone())
        .run(&range, async_executor(&harness, writer.clone()))
        .await;

    let snapshot = range.counter().snapshot();
    assert_eq!(status, RunStatus::Pass);
    assert_eq!(snapshot.get(CounterType::Read), 250);
    assert_eq!(snapshot.get(CounterType::Skipped), 1);
    assert_eq!(snapshot.get(CounterType::Write), 249);
    assert_eq!(snapshot.get(CounterType::Error), 0);
    assert_eq!(snapshot.get(CounterType::Unflushed), 0);
    assert!(snapshot.is_conserved());
    assert_eq!(writer.batches(), 5);
    assert_eq!(writer.store.len(), 249);
}

#[tokio::test]
#[traced_test]
async fn failed_async_batch_is_counted_once_as_error() {
    let config = PipelineConfig::default()
        .with_batch_size(50)
        .with_fetch_size(200);
    let harness = Harness::new(MockOrigin::default(), config);
    let writer = Arc::new(MockWriter {
        failing_batches: HashSet::from([1]),
        ..MockWriter::default()
    });
    let range = PartitionRange::new(0, 250);

    let status = CopyPipeline::new(harness.ctx.clone())
        .run(&range, async_executor(&harness, writer.clone()))
        .await;

    let snapshot = range.counter().snapshot();
    assert_eq!(status, RunStatus::Pass);
    assert_eq!(snapshot.get(CounterType::Read), 250);
    assert_eq!(snapshot.get(CounterType::Write), 200);
    assert_eq!(snapshot.get(CounterType::Error), 50);
    assert_eq!(snapshot.get(CounterType::Unflushed), 0);
    assert_eq!(snapshot.get(CounterType::PartitionsPassed), 1);
    assert!(snapshot.is_conserved());

    assert_eq!(writer.store.len(), 200);
    assert!(writer.store.get(&pk(10)).is_none());
    assert!(writer.store.get(&pk(249)).is_some());
    assert_eq!(harness.failures.record_count(), 50);
    assert_eq!(harness.failures.key_count(), 50);
    assert_eq!(
        harness.tracker.statuses(),
        vec![RunStatus::Started, RunStatus::Pass]
    );
    assert!(logs_contain("Partition finished with failed asynchronous writes"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_failures_settle_exactly_once_across_promotions() {
    let config = PipelineConfig::default()
        .with_batch_size(10)
        .with_fetch_size(30);
    let harness = Harness::new(MockOrigin::default(), config);
    let writer = Arc::new(MockWriter {
        delay: Duration::from_millis(2),
        failing_batches: HashSet::from([1, 7, 20]),
        ..MockWriter::default()
    });
    let range = PartitionRange::new(0, 300);

    let status = CopyPipeline::new(harness.ctx.clone())
        .run(&range, async_executor(&harness, writer.clone()))
        .await;

    let snapshot = range.counter().snapshot();
    assert_eq!(status, RunStatus::Pass);
    assert_eq!(writer.batches(), 30);
    assert_eq!(snapshot.get(CounterType::Write), 270);
    assert_eq!(snapshot.get(CounterType::Error), 30);
    assert_eq!(snapshot.get(CounterType::Unflushed), 0);
    assert!(snapshot.is_conserved());
    assert_eq!(writer.store.len(), 270);
}

#[tokio::test]
async fn hard_backpressure_bounds_writes_in_flight() {
    let config = PipelineConfig::default()
        .with_batch_size(5)
        .with_max_pending_writes(2)
        .with_backpressure(BackpressureConfig {
            mode: BackpressureMode::Hard,
            ..BackpressureConfig::default()
        });
    let harness = Harness::new(MockOrigin::default(), config);
    let writer = Arc::new(MockWriter {
        delay: Duration::from_millis(15),
        ..MockWriter::default()
    });
    let mut executor = AsyncBatchExecutor::new(
        writer.clone(),
        Arc::clone(&harness.ctx.write_limiter),
        &harness.ctx.config,
    );
    let counter = engine_core::counter::JobCounter::new();

    for id in 0..60 {
        let record = model::records::record::Record::new(
            pk(id),
            Arc::new(super::mocks::user_row(id)),
        );
        executor.submit(record, &counter).await.unwrap();
    }
    executor.finish(&counter).await.unwrap();
    counter.promote_unflushed();

    assert_eq!(executor.dispatched_batches(), 12);
    assert!(executor.peak_in_flight() <= 2);
    assert!(writer.peak_in_flight() <= 2);
    assert_eq!(counter.get(CounterType::Write), 60);
    assert_eq!(writer.store.len(), 60);
}

#[tokio::test]
#[traced_test]
async fn soft_backpressure_overflows_a_bounded_amount() {
    let config = PipelineConfig::default()
        .with_batch_size(5)
        .with_max_pending_writes(4)
        .with_backpressure(BackpressureConfig {
            mode: BackpressureMode::Soft,
            max_retries: 5,
            retry_delay: Duration::from_millis(1),
        });
    let harness = Harness::new(MockOrigin::default(), config);
    let writer = Arc::new(MockWriter {
        delay: Duration::from_millis(20),
        ..MockWriter::default()
    });
    let range = PartitionRange::new(0, 120);

    let status = CopyPipeline::new(harness.ctx.clone())
        .run(&range, async_executor(&harness, writer.clone()))
        .await;

    let snapshot = range.counter().snapshot();
    assert_eq!(status, RunStatus::Pass);
    assert_eq!(writer.batches(), 24);
    assert_eq!(snapshot.get(CounterType::Write), 120);
    assert!(snapshot.is_conserved());

    // the ceiling is exceeded, but only by what a wait budget lets through
    assert!(writer.peak_in_flight() > 4);
    assert!(writer.peak_in_flight() <= 3 * 4);
    assert!(logs_contain("Backpressure wait exhausted"));
}

#[tokio::test]
async fn copying_twice_leaves_the_target_unchanged() {
    let store = MemoryStore::default();
    let range = PartitionRange::new(0, 50);

    for _ in 0..2 {
        let harness = Harness::new(MockOrigin::default(), PipelineConfig::default());
        let writer = Arc::new(MockWriter::new(store.clone()));
        let run = PartitionRange::new(range.min().clone(), range.max().clone());
        let status = CopyPipeline::new(harness.ctx.clone())
            .run(&run, async_executor(&harness, writer))
            .await;
        assert_eq!(status, RunStatus::Pass);
    }

    assert_eq!(store.len(), 50);
    assert_eq!(
        store.get(&pk(42)).unwrap().get_value("name"),
        Value::String("user-42".into())
    );
}

#[tokio::test]
async fn counter_tables_merge_the_current_target_row() {
    let store = MemoryStore::with_users(0..5);
    let harness = Harness::new(
        MockOrigin::default(),
        PipelineConfig::default().with_counter_table(true),
    );
    let writer = Arc::new(MockWriter::new(store.clone()));
    let range = PartitionRange::new(0, 10);

    let status = CopyPipeline::new(harness.ctx.clone())
        .with_point_reader(Arc::new(store.clone()))
        .run(&range, async_executor(&harness, writer.clone()))
        .await;

    assert_eq!(status, RunStatus::Pass);
    assert_eq!(writer.merged(), 5);
    assert_eq!(store.len(), 10);
}

#[tokio::test]
async fn failed_counter_lookup_settles_the_record_as_error() {
    let store = MemoryStore::with_users(0..5);
    store.fail_reads_of(pk(2));
    let harness = Harness::new(
        MockOrigin::default(),
        PipelineConfig::default().with_counter_table(true),
    );
    let writer = Arc::new(MockWriter::new(store.clone()));
    let range = PartitionRange::new(0, 5);

    let status = CopyPipeline::new(harness.ctx.clone())
        .with_point_reader(Arc::new(store))
        .run(&range, async_executor(&harness, writer))
        .await;

    let snapshot = range.counter().snapshot();
    assert_eq!(status, RunStatus::Pass);
    assert_eq!(snapshot.get(CounterType::Error), 1);
    assert_eq!(snapshot.get(CounterType::Write), 4);
    assert!(snapshot.is_conserved());
    assert_eq!(harness.failures.key_count(), 1);
}

#[tokio::test]
#[traced_test]
async fn failed_sql_batch_is_rolled_back_and_later_batches_commit() {
    let harness = Harness::new(MockOrigin::default(), PipelineConfig::default().with_batch_size(50));
    let target = MockSqlTarget::failing_on([3]);
    let range = PartitionRange::new(0, 250);

    let executor = sql_executor(&harness, &target).await;
    let status = CopyPipeline::new(harness.ctx.clone())
        .run(&range, executor)
        .await;

    let snapshot = range.counter().snapshot();
    assert_eq!(status, RunStatus::Pass);
    assert_eq!(snapshot.get(CounterType::Write), 200);
    assert_eq!(snapshot.get(CounterType::Error), 50);
    assert!(snapshot.is_conserved());

    let committed = target.committed_ids();
    assert_eq!(committed.len(), 200);
    assert!(!committed.contains(&120));
    assert!(committed.contains(&249));

    let log = target.log.lock().unwrap();
    assert_eq!(log.executes, 5);
    assert_eq!(log.rollbacks, 1);
    assert!(log.closed);
    drop(log);

    assert_eq!(harness.failures.record_count(), 50);
    assert_eq!(harness.failures.key_count(), 50);
    assert!(logs_contain("Batch failed and was rolled back"));
}

#[tokio::test]
async fn failed_final_sql_batch_still_passes_the_partition() {
    let harness = Harness::new(MockOrigin::default(), PipelineConfig::default().with_batch_size(25));
    let target = MockSqlTarget::failing_on([2]);
    let range = PartitionRange::new(0, 40);

    let executor = sql_executor(&harness, &target).await;
    let status = CopyPipeline::new(harness.ctx.clone())
        .run(&range, executor)
        .await;

    let snapshot = range.counter().snapshot();
    assert_eq!(status, RunStatus::Pass);
    assert_eq!(snapshot.get(CounterType::Write), 25);
    assert_eq!(snapshot.get(CounterType::Error), 15);
    assert!(snapshot.is_conserved());
}

#[tokio::test]
#[traced_test]
async fn origin_failure_reconciles_counters_and_fails_the_partition() {
    let origin = MockOrigin {
        fail_after: Some(120),
        ..MockOrigin::default()
    };
    let harness = Harness::new(origin, PipelineConfig::default().with_batch_size(50));
    let target = MockSqlTarget::default();
    let range = PartitionRange::new(0, 500);

    let executor = sql_executor(&harness, &target).await;
    let status = CopyPipeline::new(harness.ctx.clone())
        .run(&range, executor)
        .await;

    let snapshot = range.counter().snapshot();
    assert_eq!(status, RunStatus::Fail);
    assert_eq!(snapshot.get(CounterType::Read), 120);
    assert_eq!(snapshot.get(CounterType::Write), 100);
    assert_eq!(snapshot.get(CounterType::Error), 20);
    assert_eq!(snapshot.get(CounterType::PartitionsFailed), 1);
    assert!(snapshot.is_conserved());

    assert_eq!(target.committed_ids().len(), 100);
    assert_eq!(harness.failures.record_count(), 20);
    assert!(target.log.lock().unwrap().closed);
    assert!(logs_contain("connection reset by peer"));
}

#[tokio::test]
async fn constant_columns_override_origin_values() {
    let config = PipelineConfig::default()
        .with_batch_size(10)
        .with_constant_column("score", "'0'");
    let harness = Harness::new(MockOrigin::default(), config);
    let target = MockSqlTarget::default();
    let range = PartitionRange::new(0, 10);

    let executor = sql_executor(&harness, &target).await;
    let status = CopyPipeline::new(harness.ctx.clone())
        .run(&range, executor)
        .await;

    assert_eq!(status, RunStatus::Pass);
    let log = target.log.lock().unwrap();
    assert_eq!(log.committed.len(), 10);
    assert!(log.committed.iter().all(|params| params[2] == Value::Int32(0)));
}

#[tokio::test]
async fn statement_with_wrong_parameter_count_is_rejected() {
    let harness = Harness::new(MockOrigin::default(), PipelineConfig::default());
    let target = MockSqlTarget {
        parameter_count: Some(2),
        ..MockSqlTarget::default()
    };
    let table = users_table();

    let prepared = TransactionalExecutor::prepare(
        &target,
        &table,
        &harness.ctx.config,
        Arc::clone(&harness.ctx.write_limiter),
    )
    .await;
    assert!(prepared.is_err());
}
