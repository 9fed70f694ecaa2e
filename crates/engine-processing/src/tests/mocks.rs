use async_trait::async_trait;
use connectors::sql::base::metadata::{column::ColumnMetadata, table::TableMetadata};
use engine_core::{
    connectors::{
        origin::{OriginReader, RangeQuery, RowStream, key_factory::KeyFactory},
        sink::{FailureSink, RunTracker},
        target::{
            AsyncTargetWriter, BatchStatement, BoundWrite, TargetPointReader, TransactionalTarget,
            WriteBatch, WriteHandle,
        },
    },
    counter::CounterSnapshot,
    error::{SinkError, SourceError, TargetError},
    metrics::JobMetrics,
};
use futures::{FutureExt, stream};
use model::{
    core::value::{FieldValue, Value},
    execution::run::RunStatus,
    records::{key::PrimaryKey, record::Record, row::RowData},
};
use num_bigint::BigInt;
use std::{
    collections::{HashMap, HashSet},
    error::Error,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::{config::PipelineConfig, pipeline::PipelineContext};

pub fn user_row(id: i64) -> RowData {
    RowData::new(
        "users",
        vec![
            FieldValue::new("id", Value::Int(id)),
            FieldValue::new("name", Value::String(format!("user-{id}"))),
            FieldValue::new("score", Value::Int32((id % 100) as i32)),
        ],
    )
}

pub fn pk(id: i64) -> PrimaryKey {
    PrimaryKey::new(vec!["id".into()], vec![Value::Int(id)])
}

pub fn users_table() -> TableMetadata {
    TableMetadata::new(
        "public",
        "users",
        vec![
            ColumnMetadata::new("id", 1, "bigint"),
            ColumnMetadata::new("name", 2, "text"),
            ColumnMetadata::new("score", 3, "integer"),
        ],
        vec!["id".into()],
    )
    .unwrap()
}

fn token(value: &BigInt) -> i64 {
    i64::try_from(value.clone()).unwrap()
}

/// Origin whose token ring holds one user row per token: the range
/// `[min, max)` yields users `min..max`.
#[derive(Default)]
pub struct MockOrigin {
    pub filtered: HashSet<i64>,
    /// The stream breaks after this many rows.
    pub fail_after: Option<usize>,
    /// Ranges containing this token cannot be queried.
    pub poisoned: Option<i64>,
}

#[async_trait]
impl OriginReader for MockOrigin {
    async fn execute(&self, query: RangeQuery) -> Result<RowStream, SourceError> {
        let (min, max) = (token(&query.min), token(&query.max));
        if let Some(poisoned) = self.poisoned {
            if (min..max).contains(&poisoned) {
                return Err(SourceError::Query(format!("token {poisoned} unavailable")));
            }
        }

        let mut rows = (min..max).map(|id| Ok(user_row(id))).collect::<Vec<_>>();
        if let Some(limit) = self.fail_after {
            rows.truncate(limit);
            rows.push(Err(SourceError::Read("connection reset by peer".into())));
        }
        Ok(Box::pin(stream::iter(rows)))
    }

    fn should_filter(&self, row: &RowData) -> bool {
        matches!(row.get_value("id"), Value::Int(id) if self.filtered.contains(&id))
    }
}

/// Target rows by primary key.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<HashMap<PrimaryKey, RowData>>>,
    failing: Arc<Mutex<HashSet<PrimaryKey>>>,
    lookup_delay: Duration,
    lookups: Arc<AtomicUsize>,
    lookup_peak: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn with_users(ids: impl IntoIterator<Item = i64>) -> Self {
        let store = Self::default();
        for id in ids {
            store.put(pk(id), user_row(id));
        }
        store
    }

    /// Point reads take `delay` each.
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = delay;
        self
    }

    /// Most point reads observed running at the same time.
    pub fn peak_lookups(&self) -> usize {
        self.lookup_peak.load(Ordering::SeqCst)
    }

    pub fn put(&self, pk: PrimaryKey, row: RowData) {
        self.rows.lock().unwrap().insert(pk, row);
    }

    pub fn remove(&self, pk: &PrimaryKey) {
        self.rows.lock().unwrap().remove(pk);
    }

    /// Point reads of `pk` fail from now on.
    pub fn fail_reads_of(&self, pk: PrimaryKey) {
        self.failing.lock().unwrap().insert(pk);
    }

    pub fn get(&self, pk: &PrimaryKey) -> Option<RowData> {
        self.rows.lock().unwrap().get(pk).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl TargetPointReader for MemoryStore {
    async fn get_record(&self, pk: &PrimaryKey) -> Result<Option<RowData>, TargetError> {
        if !self.lookup_delay.is_zero() {
            let now = self.lookups.fetch_add(1, Ordering::SeqCst) + 1;
            self.lookup_peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.lookup_delay).await;
            self.lookups.fetch_sub(1, Ordering::SeqCst);
        }

        if self.failing.lock().unwrap().contains(pk) {
            return Err(TargetError::Lookup(format!("read of {pk} timed out")));
        }
        Ok(self.get(pk))
    }
}

/// Peer-store writer applying batches to a [`MemoryStore`] after `delay`.
#[derive(Default)]
pub struct MockWriter {
    pub store: MemoryStore,
    pub delay: Duration,
    /// Records binding to no write.
    pub unbound: HashSet<i64>,
    /// 1-based numbers of the batches the target rejects.
    pub failing_batches: HashSet<usize>,
    pub batches: AtomicUsize,
    pub merged: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl MockWriter {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Records bound with a target row attached.
    pub fn merged(&self) -> usize {
        self.merged.load(Ordering::SeqCst)
    }
}

impl AsyncTargetWriter for MockWriter {
    fn bind(&self, record: &Record) -> Result<Option<BoundWrite>, TargetError> {
        if let Value::Int(id) = record.origin.get_value("id") {
            if self.unbound.contains(&id) {
                return Ok(None);
            }
        }
        if record.target.is_some() {
            self.merged.fetch_add(1, Ordering::SeqCst);
        }

        let values = record
            .origin
            .field_values
            .iter()
            .map(|f| (f.name.clone(), f.value.clone().unwrap_or(Value::Null)))
            .collect();
        Ok(Some(BoundWrite {
            pk: record.pk.clone(),
            values,
        }))
    }

    fn execute_async(&self, batch: WriteBatch) -> WriteHandle {
        let number = self.batches.fetch_add(1, Ordering::SeqCst) + 1;
        let fails = self.failing_batches.contains(&number);
        let store = self.store.clone();
        let delay = self.delay;
        let in_flight = Arc::clone(&self.in_flight);
        let peak = Arc::clone(&self.peak);

        async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);

            if fails {
                return Err(TargetError::Write(format!("batch {number} rejected")));
            }
            let applied = batch.len() as u64;
            for write in batch.writes {
                let fields = write
                    .values
                    .into_iter()
                    .map(|(name, value)| FieldValue::new(name, value))
                    .collect();
                store.put(write.pk, RowData::new("users", fields));
            }
            Ok(applied)
        }
        .boxed()
    }
}

/// What the SQL target saw through its statements.
#[derive(Debug, Default)]
pub struct TxLog {
    pub committed: Vec<Vec<Value>>,
    pub executes: usize,
    pub rollbacks: usize,
    pub closed: bool,
}

#[derive(Clone, Default)]
pub struct MockSqlTarget {
    pub log: Arc<Mutex<TxLog>>,
    /// 1-based numbers of the batch executions that fail.
    pub failing_executes: HashSet<usize>,
    pub parameter_count: Option<usize>,
}

impl MockSqlTarget {
    pub fn failing_on(executes: impl IntoIterator<Item = usize>) -> Self {
        Self {
            failing_executes: executes.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn committed_ids(&self) -> Vec<i64> {
        self.log
            .lock()
            .unwrap()
            .committed
            .iter()
            .filter_map(|params| match params.first() {
                Some(Value::Int(id)) => Some(*id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TransactionalTarget for MockSqlTarget {
    async fn prepare(&self, sql: &str) -> Result<Box<dyn BatchStatement>, TargetError> {
        let count = self
            .parameter_count
            .unwrap_or_else(|| sql.matches('$').count());
        Ok(Box::new(MockStatement {
            count,
            current: vec![None; count],
            queued: Vec::new(),
            executed: Vec::new(),
            auto_commit: true,
            target: self.clone(),
        }))
    }
}

struct MockStatement {
    count: usize,
    current: Vec<Option<Value>>,
    queued: Vec<Vec<Value>>,
    executed: Vec<Vec<Value>>,
    auto_commit: bool,
    target: MockSqlTarget,
}

#[async_trait]
impl BatchStatement for MockStatement {
    fn parameter_count(&self) -> usize {
        self.count
    }

    fn bind_parameter(&mut self, index: usize, value: Value) -> Result<(), TargetError> {
        let slot = index
            .checked_sub(1)
            .and_then(|i| self.current.get_mut(i))
            .ok_or_else(|| TargetError::Write(format!("no parameter ${index}")))?;
        *slot = Some(value);
        Ok(())
    }

    fn clear_parameters(&mut self) {
        self.current = vec![None; self.count];
    }

    fn add_to_batch(&mut self) -> Result<(), TargetError> {
        let params = self
            .current
            .iter()
            .cloned()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| TargetError::Write("unbound parameter".into()))?;
        self.queued.push(params);
        Ok(())
    }

    async fn execute_batch(&mut self) -> Result<Vec<u64>, TargetError> {
        let queued = std::mem::take(&mut self.queued);
        let number = {
            let mut log = self.target.log.lock().unwrap();
            log.executes += 1;
            log.executes
        };
        if self.target.failing_executes.contains(&number) {
            return Err(TargetError::Write("deadlock detected".into()));
        }
        let affected = vec![1; queued.len()];
        self.executed.extend(queued);
        if self.auto_commit {
            self.commit().await?;
        }
        Ok(affected)
    }

    async fn commit(&mut self) -> Result<(), TargetError> {
        let executed = std::mem::take(&mut self.executed);
        self.target.log.lock().unwrap().committed.extend(executed);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TargetError> {
        self.executed.clear();
        self.queued.clear();
        self.target.log.lock().unwrap().rollbacks += 1;
        Ok(())
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), TargetError> {
        self.auto_commit = auto_commit;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TargetError> {
        self.target.log.lock().unwrap().closed = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct CollectingFailures {
    pub records: Mutex<Vec<(PrimaryKey, String)>>,
    pub keys: Mutex<Vec<(PrimaryKey, String)>>,
}

impl CollectingFailures {
    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn key_count(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    pub fn key_errors(&self) -> Vec<String> {
        self.keys
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }
}

impl FailureSink for CollectingFailures {
    fn log_failed_record(
        &self,
        record: &Record,
        error: &(dyn Error + Send + Sync + 'static),
    ) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap()
            .push((record.pk.clone(), error.to_string()));
        Ok(())
    }

    fn log_failed_key(
        &self,
        record: &Record,
        error: &(dyn Error + Send + Sync + 'static),
    ) -> Result<(), SinkError> {
        self.keys
            .lock()
            .unwrap()
            .push((record.pk.clone(), error.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTracker {
    pub updates: Mutex<Vec<(BigInt, RunStatus)>>,
}

impl MemoryTracker {
    pub fn statuses(&self) -> Vec<RunStatus> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .map(|(_, s)| *s)
            .collect()
    }
}

#[async_trait]
impl RunTracker for MemoryTracker {
    async fn update_run(
        &self,
        _run_id: &str,
        partition_key: &BigInt,
        status: RunStatus,
        _snapshot: &CounterSnapshot,
    ) -> Result<(), SinkError> {
        self.updates
            .lock()
            .unwrap()
            .push((partition_key.clone(), status));
        Ok(())
    }
}

/// A context over `origin` with every collaborator observable.
pub struct Harness {
    pub ctx: PipelineContext,
    pub metrics: JobMetrics,
    pub failures: Arc<CollectingFailures>,
    pub tracker: Arc<MemoryTracker>,
}

impl Harness {
    pub fn new(origin: MockOrigin, config: PipelineConfig) -> Self {
        let metrics = JobMetrics::new();
        let failures = Arc::new(CollectingFailures::default());
        let tracker = Arc::new(MemoryTracker::default());
        let ctx = PipelineContext::new(
            "run-1",
            config,
            Arc::new(origin),
            KeyFactory::new(vec!["id".into()]),
            Arc::new(metrics.clone()),
        )
        .with_failure_sink(failures.clone())
        .with_run_tracker(tracker.clone());

        Self {
            ctx,
            metrics,
            failures,
            tracker,
        }
    }
}
