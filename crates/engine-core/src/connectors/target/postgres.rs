use crate::{
    connectors::target::{BatchStatement, SchemaProvider, TargetPointReader, TransactionalTarget},
    error::TargetError,
};
use async_trait::async_trait;
use connectors::sql::{
    base::{coercion, metadata::table::TableMetadata},
    postgres::{adapter::PgAdapter, batch::PgBatchStatement, config::TargetConfig},
};
use model::{
    core::{data_type::BindType, value::Value},
    records::{key::PrimaryKey, row::RowData},
};
use std::sync::Arc;

/// SQL target reached through `tokio-postgres`: hands out dedicated batch
/// statements for writers and serves key lookups for validation.
#[derive(Clone)]
pub struct PgTarget {
    adapter: PgAdapter,
    table: Arc<TableMetadata>,
}

impl PgTarget {
    pub async fn connect(config: &TargetConfig) -> Result<Self, TargetError> {
        let adapter = PgAdapter::connect_with(config).await?;
        let table = adapter
            .table_metadata(&config.schema, &config.table)
            .await?;
        Ok(Self::new(adapter, table))
    }

    pub fn new(adapter: PgAdapter, table: TableMetadata) -> Self {
        Self {
            adapter,
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &TableMetadata {
        &self.table
    }

    pub fn adapter(&self) -> &PgAdapter {
        &self.adapter
    }
}

/// Key values in table key order, converted to the key columns' bind types.
fn key_values(table: &TableMetadata, pk: &PrimaryKey) -> Result<Vec<Value>, TargetError> {
    table
        .primary_keys
        .iter()
        .map(|column| {
            let value = pk
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, value)| value)
                .ok_or_else(|| TargetError::Lookup(format!("key {pk} has no value for {column}")))?;
            let bind_type = table.bind_type(column).cloned().unwrap_or(BindType::Text);
            Ok(coercion::convert(value, None, &bind_type))
        })
        .collect()
}

#[async_trait]
impl TransactionalTarget for PgTarget {
    async fn prepare(&self, sql: &str) -> Result<Box<dyn BatchStatement>, TargetError> {
        let statement = self.adapter.dedicated_statement(sql).await?;
        Ok(Box::new(statement))
    }
}

#[async_trait]
impl TargetPointReader for PgTarget {
    async fn get_record(&self, pk: &PrimaryKey) -> Result<Option<RowData>, TargetError> {
        let key = key_values(&self.table, pk)?;
        Ok(self.adapter.fetch_by_key(&self.table, key).await?)
    }
}

impl SchemaProvider for PgTarget {
    fn table_name(&self) -> String {
        self.table.table_name()
    }

    fn all_column_names(&self) -> Vec<String> {
        self.table.all_column_names()
    }

    fn primary_key_names(&self) -> Vec<String> {
        self.table.primary_key_names()
    }

    fn bind_type(&self, column: &str) -> Option<BindType> {
        SchemaProvider::bind_type(self.table.as_ref(), column)
    }

    fn upsert_sql(&self) -> Result<String, TargetError> {
        self.table.upsert_sql()
    }
}

#[async_trait]
impl BatchStatement for PgBatchStatement {
    fn parameter_count(&self) -> usize {
        PgBatchStatement::parameter_count(self)
    }

    fn bind_parameter(&mut self, index: usize, value: Value) -> Result<(), TargetError> {
        Ok(self.bind(index, value)?)
    }

    fn clear_parameters(&mut self) {
        PgBatchStatement::clear_parameters(self)
    }

    fn add_to_batch(&mut self) -> Result<(), TargetError> {
        if self.is_closed() {
            return Err(TargetError::Closed);
        }
        PgBatchStatement::add_to_batch(self);
        Ok(())
    }

    async fn execute_batch(&mut self) -> Result<Vec<u64>, TargetError> {
        Ok(PgBatchStatement::execute_batch(self).await?)
    }

    async fn commit(&mut self) -> Result<(), TargetError> {
        Ok(PgBatchStatement::commit(self).await?)
    }

    async fn rollback(&mut self) -> Result<(), TargetError> {
        Ok(PgBatchStatement::rollback(self).await?)
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), TargetError> {
        Ok(PgBatchStatement::set_auto_commit(self, auto_commit).await?)
    }

    async fn close(&mut self) -> Result<(), TargetError> {
        Ok(PgBatchStatement::close(self).await?)
    }
}
