use crate::sql::base::{error::DbError, metadata::column::ColumnMetadata};
use model::core::data_type::BindType;
use serde::{Deserialize, Serialize};

/// Column layout and primary key of one target table, in ordinal order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableMetadata {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnMetadata>,
    pub primary_keys: Vec<String>,
}

impl TableMetadata {
    pub fn new(
        schema: &str,
        name: &str,
        mut columns: Vec<ColumnMetadata>,
        primary_keys: Vec<String>,
    ) -> Result<Self, DbError> {
        let qualified = format!("{schema}.{name}");
        if columns.is_empty() {
            return Err(DbError::TableNotFound(qualified));
        }
        if primary_keys.is_empty() {
            return Err(DbError::MissingPrimaryKey(qualified));
        }

        columns.sort_by_key(|c| c.ordinal);
        for column in columns.iter_mut() {
            column.is_primary_key = primary_keys
                .iter()
                .any(|pk| pk.eq_ignore_ascii_case(&column.name));
        }

        if let Some(missing) = primary_keys
            .iter()
            .find(|pk| !columns.iter().any(|c| c.name.eq_ignore_ascii_case(pk)))
        {
            return Err(DbError::QueryBuildError(format!(
                "Primary key column {missing} is not a column of {qualified}"
            )));
        }

        Ok(Self {
            schema: schema.to_string(),
            name: name.to_string(),
            columns,
            primary_keys,
        })
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn non_key_columns(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter().filter(|c| !c.is_primary_key)
    }

    pub fn bind_type(&self, column: &str) -> Option<&BindType> {
        self.column(column).map(|c| &c.data_type)
    }
}
