use crate::sql::{
    base::{
        error::DbError,
        metadata::{column::ColumnMetadata, table::TableMetadata},
        query::generator::QueryGenerator,
    },
    postgres::{
        batch::PgBatchStatement,
        config::TargetConfig,
        params::PgParamStore,
        row::to_row_data,
        utils::{connect_client, connect_target},
    },
};
use model::{core::value::Value, records::row::RowData};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tokio_postgres::{Client, Statement};
use tracing::{debug, info};

const QUERY_TABLE_COLUMNS_SQL: &str = include_str!("sql/table_columns.sql");
const QUERY_TABLE_PRIMARY_KEY_SQL: &str = include_str!("sql/table_primary_key.sql");

#[derive(Clone)]
enum Endpoint {
    Url(String),
    Settings(Box<TargetConfig>),
}

/// Shared connection to the SQL target.
///
/// Point lookups share one client; batch writers get their own connection
/// through [`PgAdapter::dedicated_statement`].
#[derive(Clone)]
pub struct PgAdapter {
    client: Arc<Client>,
    endpoint: Endpoint,
    statements: Arc<RwLock<HashMap<String, Statement>>>,
}

impl PgAdapter {
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let client = connect_client(url).await?;
        Ok(Self::with_client(client, Endpoint::Url(url.to_string())))
    }

    pub async fn connect_with(settings: &TargetConfig) -> Result<Self, DbError> {
        let client = connect_target(settings).await?;
        info!(target_db = %settings, "Connected to SQL target");
        Ok(Self::with_client(
            client,
            Endpoint::Settings(Box::new(settings.clone())),
        ))
    }

    fn with_client(client: Client, endpoint: Endpoint) -> Self {
        Self {
            client: Arc::new(client),
            endpoint,
            statements: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn open_connection(&self) -> Result<Client, DbError> {
        let client = match &self.endpoint {
            Endpoint::Url(url) => connect_client(url).await?,
            Endpoint::Settings(settings) => connect_target(settings).await?,
        };
        Ok(client)
    }

    pub async fn server_version(&self) -> Result<String, DbError> {
        let row = self.client.query_one("SELECT version()", &[]).await?;
        Ok(row.try_get(0)?)
    }

    /// Loads column layout and primary key from `information_schema`.
    pub async fn table_metadata(&self, schema: &str, table: &str) -> Result<TableMetadata, DbError> {
        let rows = self
            .client
            .query(QUERY_TABLE_COLUMNS_SQL, &[&schema, &table])
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("column_name")?;
            let type_name: String = row.try_get("type_name")?;
            let nullable: String = row.try_get("is_nullable")?;
            let ordinal: i32 = row.try_get("ordinal")?;

            let mut column = ColumnMetadata::new(&name, ordinal, &type_name);
            column.is_nullable = nullable.eq_ignore_ascii_case("YES");
            columns.push(column);
        }

        let primary_keys = self
            .client
            .query(QUERY_TABLE_PRIMARY_KEY_SQL, &[&schema, &table])
            .await?
            .iter()
            .map(|row| row.try_get::<_, String>("column_name"))
            .collect::<Result<Vec<_>, _>>()?;

        let metadata = TableMetadata::new(schema, table, columns, primary_keys)?;
        debug!(
            table = %metadata.qualified_name(),
            columns = metadata.columns.len(),
            primary_key = ?metadata.primary_keys,
            "Loaded table metadata"
        );
        Ok(metadata)
    }

    async fn cached_statement(&self, sql: &str) -> Result<Statement, DbError> {
        if let Some(statement) = self.statements.read().await.get(sql) {
            return Ok(statement.clone());
        }

        let statement = self.client.prepare(sql).await?;
        self.statements
            .write()
            .await
            .insert(sql.to_string(), statement.clone());
        Ok(statement)
    }

    /// Reads one row by primary key; `key` follows the table's key order.
    pub async fn fetch_by_key(
        &self,
        table: &TableMetadata,
        key: Vec<Value>,
    ) -> Result<Option<RowData>, DbError> {
        let sql = QueryGenerator::new(table).select_by_key();
        let statement = self.cached_statement(&sql).await?;
        let bindings = PgParamStore::from_values(key);

        let row = self.client.query_opt(&statement, &bindings.as_refs()).await?;
        Ok(row.map(|r| to_row_data(&r, &table.name)))
    }

    /// Prepares `sql` on a fresh connection owned by the returned statement.
    pub async fn dedicated_statement(&self, sql: &str) -> Result<PgBatchStatement, DbError> {
        let client = self.open_connection().await?;
        PgBatchStatement::prepare(client, sql).await
    }
}
