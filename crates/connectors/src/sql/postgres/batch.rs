use crate::sql::{base::error::DbError, postgres::params::PgParamStore};
use futures_util::future::try_join_all;
use model::core::value::Value;
use tokio_postgres::{Client, Statement, types::ToSql};
use tracing::{debug, warn};

/// A statement prepared once on a dedicated connection, fed row by row and
/// executed as one driver-level batch.
///
/// With auto-commit disabled the first batch opens a transaction that stays
/// open until `commit` or `rollback`.
pub struct PgBatchStatement {
    client: Option<Client>,
    statement: Statement,
    current: Vec<Value>,
    batch: Vec<Vec<Value>>,
    auto_commit: bool,
    in_transaction: bool,
}

impl PgBatchStatement {
    pub async fn prepare(client: Client, sql: &str) -> Result<Self, DbError> {
        let statement = client.prepare(sql).await?;
        let count = statement.params().len();
        debug!(params = count, "Prepared batch statement");

        Ok(Self {
            client: Some(client),
            statement,
            current: vec![Value::Null; count],
            batch: Vec::new(),
            auto_commit: true,
            in_transaction: false,
        })
    }

    fn client(&self) -> Result<&Client, DbError> {
        self.client.as_ref().ok_or(DbError::StatementClosed)
    }

    pub fn parameter_count(&self) -> usize {
        self.current.len()
    }

    /// Binds a value to a 1-based placeholder index.
    pub fn bind(&mut self, index: usize, value: Value) -> Result<(), DbError> {
        let count = self.current.len();
        match index.checked_sub(1).and_then(|i| self.current.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(DbError::ParameterIndex { index, count }),
        }
    }

    pub fn clear_parameters(&mut self) {
        self.current.iter_mut().for_each(|v| *v = Value::Null);
    }

    pub fn add_to_batch(&mut self) {
        self.batch.push(self.current.clone());
    }

    pub fn batch_len(&self) -> usize {
        self.batch.len()
    }

    /// Executes every queued row, pipelined on the connection. The queue is
    /// emptied whether or not execution succeeds.
    pub async fn execute_batch(&mut self) -> Result<Vec<u64>, DbError> {
        let rows = std::mem::take(&mut self.batch);
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        if !self.auto_commit && !self.in_transaction {
            self.client()?.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }

        let stores: Vec<PgParamStore> = rows.into_iter().map(PgParamStore::from_values).collect();
        let params: Vec<Vec<&(dyn ToSql + Sync)>> = stores.iter().map(|s| s.as_refs()).collect();

        let client = self.client()?;
        let counts = try_join_all(params.iter().map(|p| client.execute(&self.statement, p))).await?;
        Ok(counts)
    }

    pub async fn commit(&mut self) -> Result<(), DbError> {
        if self.in_transaction {
            self.client()?.batch_execute("COMMIT").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), DbError> {
        if self.in_transaction {
            self.in_transaction = false;
            self.client()?.batch_execute("ROLLBACK").await?;
        }
        Ok(())
    }

    /// Turning auto-commit back on commits any open transaction.
    pub async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), DbError> {
        if auto_commit && self.in_transaction {
            self.commit().await?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_none()
    }

    /// Restores auto-commit and releases the connection.
    pub async fn close(&mut self) -> Result<(), DbError> {
        if self.client.is_none() {
            return Ok(());
        }
        if !self.batch.is_empty() {
            warn!(rows = self.batch.len(), "Closing statement with unexecuted rows");
            self.batch.clear();
        }
        let result = self.set_auto_commit(true).await;
        self.client = None;
        result
    }
}
