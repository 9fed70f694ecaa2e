use crate::error::TargetError;
use async_trait::async_trait;
use connectors::sql::base::{metadata::table::TableMetadata, query::generator::QueryGenerator};
use futures::future::BoxFuture;
use model::{
    core::{data_type::BindType, value::Value},
    records::{key::PrimaryKey, record::Record, row::RowData},
};

pub mod postgres;

/// A record bound into one write operation: its key plus the column values to
/// write, already in the target's representation.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundWrite {
    pub pk: PrimaryKey,
    pub values: Vec<(String, Value)>,
}

/// One or more bound writes dispatched together.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub writes: Vec<BoundWrite>,
}

impl WriteBatch {
    pub fn single(write: BoundWrite) -> Self {
        Self {
            writes: vec![write],
        }
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

impl From<Vec<BoundWrite>> for WriteBatch {
    fn from(writes: Vec<BoundWrite>) -> Self {
        Self { writes }
    }
}

/// Resolves once the target has acknowledged or rejected a dispatched batch.
pub type WriteHandle = BoxFuture<'static, Result<u64, TargetError>>;

/// Fire-and-forget writer of a peer store.
pub trait AsyncTargetWriter: Send + Sync {
    /// `Ok(None)` marks a record that intentionally produces no write.
    fn bind(&self, record: &Record) -> Result<Option<BoundWrite>, TargetError>;

    /// Starts the write and returns immediately.
    fn execute_async(&self, batch: WriteBatch) -> WriteHandle;
}

/// Primary-key point reads against the target.
#[async_trait]
pub trait TargetPointReader: Send + Sync {
    async fn get_record(&self, pk: &PrimaryKey) -> Result<Option<RowData>, TargetError>;
}

/// A prepared statement owning its connection, fed through a driver batch.
#[async_trait]
pub trait BatchStatement: Send {
    fn parameter_count(&self) -> usize;

    /// `index` is 1-based.
    fn bind_parameter(&mut self, index: usize, value: Value) -> Result<(), TargetError>;

    fn clear_parameters(&mut self);

    fn add_to_batch(&mut self) -> Result<(), TargetError>;

    /// Rows affected per queued parameter set.
    async fn execute_batch(&mut self) -> Result<Vec<u64>, TargetError>;

    async fn commit(&mut self) -> Result<(), TargetError>;

    async fn rollback(&mut self) -> Result<(), TargetError>;

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), TargetError>;

    async fn close(&mut self) -> Result<(), TargetError>;
}

#[async_trait]
pub trait TransactionalTarget: Send + Sync {
    async fn prepare(&self, sql: &str) -> Result<Box<dyn BatchStatement>, TargetError>;
}

pub trait SchemaProvider: Send + Sync {
    fn table_name(&self) -> String;

    /// Every column, in ordinal order.
    fn all_column_names(&self) -> Vec<String>;

    fn primary_key_names(&self) -> Vec<String>;

    fn bind_type(&self, column: &str) -> Option<BindType>;

    fn upsert_sql(&self) -> Result<String, TargetError>;
}

impl SchemaProvider for TableMetadata {
    fn table_name(&self) -> String {
        self.qualified_name()
    }

    fn all_column_names(&self) -> Vec<String> {
        self.column_names()
    }

    fn primary_key_names(&self) -> Vec<String> {
        self.primary_keys.clone()
    }

    fn bind_type(&self, column: &str) -> Option<BindType> {
        TableMetadata::bind_type(self, column).cloned()
    }

    fn upsert_sql(&self) -> Result<String, TargetError> {
        Ok(QueryGenerator::new(self).upsert()?)
    }
}
