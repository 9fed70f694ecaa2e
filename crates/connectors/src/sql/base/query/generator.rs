use crate::sql::base::{error::DbError, metadata::table::TableMetadata};

/// Builds the statements the target side needs, once per table.
pub struct QueryGenerator<'a> {
    table: &'a TableMetadata,
}

impl<'a> QueryGenerator<'a> {
    pub fn new(table: &'a TableMetadata) -> Self {
        Self { table }
    }

    /// `INSERT .. ON CONFLICT (pk) DO UPDATE SET c = EXCLUDED.c` over every column.
    pub fn upsert(&self) -> Result<String, DbError> {
        if self.table.primary_keys.is_empty() {
            return Err(DbError::MissingPrimaryKey(self.table.qualified_name()));
        }

        let columns = self.table.column_names().join(", ");
        let placeholders = self
            .table
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                if col.requires_text_cast() {
                    format!("${}::text::{}", i + 1, col.type_name)
                } else {
                    format!("${}", i + 1)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let conflict = self.table.primary_keys.join(", ");

        let updates = self
            .table
            .non_key_columns()
            .map(|c| format!("{0} = EXCLUDED.{0}", c.name))
            .collect::<Vec<_>>();

        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            self.table.qualified_name(),
            columns,
            placeholders,
            conflict,
            action
        ))
    }

    /// Point lookup by primary key, parameters in primary-key order.
    pub fn select_by_key(&self) -> String {
        let predicate = self
            .table
            .primary_keys
            .iter()
            .enumerate()
            .map(|(i, pk)| format!("{pk} = ${}", i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");

        format!(
            "SELECT {} FROM {} WHERE {}",
            self.table.column_names().join(", "),
            self.table.qualified_name(),
            predicate
        )
    }
}
