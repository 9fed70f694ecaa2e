use thiserror::Error;

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Any error reported by the Postgres driver or server.
    #[error("SQL error: {0}")]
    Sql(#[from] tokio_postgres::Error),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table {0} has no primary key")]
    MissingPrimaryKey(String),

    /// A parameter index outside the prepared statement's placeholders.
    #[error("Parameter index {index} out of range (statement has {count} parameters)")]
    ParameterIndex { index: usize, count: usize },

    /// An error occurred while building a SQL query.
    #[error("Query build error: {0}")]
    QueryBuildError(String),

    #[error("Statement already closed")]
    StatementClosed,

    #[error("Connection error: {0}")]
    Connector(#[from] ConnectorError),
}

/// Errors happening while opening a connection.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Failed to read TLS root certificate: {0}")]
    Io(#[from] std::io::Error),

    #[error("Postgres connection failed: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

impl DbError {
    /// SQLSTATE code reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            DbError::Sql(err) => err.code().map(|c| c.code()),
            _ => None,
        }
    }
}
