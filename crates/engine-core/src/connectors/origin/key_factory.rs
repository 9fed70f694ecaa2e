use model::{
    core::value::Value,
    records::{key::PrimaryKey, record::Record, row::RowData},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Turns every entry of a map column into its own target row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplodeMap {
    /// Origin map column.
    pub column: String,
    /// Target column receiving the map key.
    pub key_column: String,
    /// Target column receiving the map value.
    pub value_column: String,
}

/// Builds target records, keyed by the target primary key, from origin rows.
#[derive(Debug, Clone)]
pub struct KeyFactory {
    key_columns: Vec<String>,
    explode: Option<ExplodeMap>,
}

impl KeyFactory {
    pub fn new(key_columns: Vec<String>) -> Self {
        Self {
            key_columns,
            explode: None,
        }
    }

    pub fn with_explode_map(mut self, explode: ExplodeMap) -> Self {
        self.explode = Some(explode);
        self
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn key_for(&self, row: &RowData) -> PrimaryKey {
        let values = self
            .key_columns
            .iter()
            .map(|column| row.get_value(column))
            .collect();
        PrimaryKey::new(self.key_columns.clone(), values)
    }

    /// Expands one origin row into its valid target records. Records with a
    /// missing key component are dropped, so the result may be empty.
    pub fn expand(&self, origin: &Arc<RowData>) -> Vec<Record> {
        let candidates = match &self.explode {
            None => vec![Record::new(self.key_for(origin), Arc::clone(origin))],
            Some(explode) => self.explode_row(origin, explode),
        };

        candidates
            .into_iter()
            .filter(|record| {
                let valid = record.is_valid();
                if !valid {
                    debug!(key = %record.pk, "Dropping record with incomplete primary key");
                }
                valid
            })
            .collect()
    }

    fn explode_row(&self, origin: &RowData, explode: &ExplodeMap) -> Vec<Record> {
        let entries = match origin.get_value(&explode.column) {
            Value::Map(entries) => entries,
            Value::Null => return Vec::new(),
            other => {
                debug!(column = %explode.column, kind = other.kind(), "Explode column is not a map");
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .map(|(key, value)| {
                let mut row = origin.clone();
                row.field_values
                    .retain(|f| !f.name.eq_ignore_ascii_case(&explode.column));
                row.set(&explode.key_column, key);
                row.set(&explode.value_column, value);
                Record::new(self.key_for(&row), Arc::new(row))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::value::FieldValue;

    fn row(id: Value) -> Arc<RowData> {
        Arc::new(RowData::new(
            "events",
            vec![
                FieldValue::new("id", id),
                FieldValue::new("name", Value::String("a".into())),
                FieldValue::new(
                    "attrs",
                    Value::Map(vec![
                        (Value::String("color".into()), Value::String("red".into())),
                        (Value::String("size".into()), Value::String("xl".into())),
                    ]),
                ),
            ],
        ))
    }

    #[test]
    fn single_record_per_row() {
        let factory = KeyFactory::new(vec!["id".into()]);
        let records = factory.expand(&row(Value::Int(7)));

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pk.values, vec![Value::Int(7)]);
        assert_eq!(records[0].pk.to_string(), "(id=7)");
    }

    #[test]
    fn null_key_component_is_dropped() {
        let factory = KeyFactory::new(vec!["id".into(), "name".into()]);
        assert!(factory.expand(&row(Value::Null)).is_empty());

        let missing_column = KeyFactory::new(vec!["tenant".into()]);
        assert!(missing_column.expand(&row(Value::Int(1))).is_empty());
    }

    #[test]
    fn explode_map_fans_out() {
        let factory = KeyFactory::new(vec!["id".into(), "attr".into()]).with_explode_map(
            ExplodeMap {
                column: "attrs".into(),
                key_column: "attr".into(),
                value_column: "attr_value".into(),
            },
        );

        let records = factory.expand(&row(Value::Int(1)));
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].pk.values,
            vec![Value::Int(1), Value::String("size".into())]
        );
        assert_eq!(
            records[1].origin.get_value("attr_value"),
            Value::String("xl".into())
        );
        assert!(records[0].origin.get("attrs").is_none());
    }
}
