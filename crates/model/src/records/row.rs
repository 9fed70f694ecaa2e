use crate::core::{
    data_type::SourceType,
    value::{FieldValue, Value},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row as handed out by a store, with the declared origin type per column
/// when the reader knows it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RowData {
    pub entity: String,
    pub field_values: Vec<FieldValue>,
    #[serde(default)]
    pub source_types: HashMap<String, SourceType>,
}

impl RowData {
    pub fn new(entity: &str, field_values: Vec<FieldValue>) -> Self {
        RowData {
            entity: entity.to_string(),
            field_values,
            source_types: HashMap::new(),
        }
    }

    pub fn with_source_type(mut self, column: &str, source_type: SourceType) -> Self {
        self.source_types.insert(column.to_lowercase(), source_type);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.field_values
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field))
    }

    pub fn get_value(&self, field: &str) -> Value {
        self.get(field)
            .and_then(|f| f.value.clone())
            .unwrap_or(Value::Null)
    }

    pub fn source_type(&self, field: &str) -> Option<&SourceType> {
        self.source_types.get(&field.to_lowercase())
    }

    pub fn set(&mut self, field: &str, value: Value) {
        let value = FieldValue::new(field, value);
        match self
            .field_values
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(field))
        {
            Some(existing) => existing.value = value.value,
            None => self.field_values.push(value),
        }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.field_values.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.field_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_values.is_empty()
    }

    /// Values joined with `|`, the layout used in failure logs.
    pub fn flat_values(&self) -> String {
        self.field_values
            .iter()
            .map(|f| f.value.as_ref().unwrap_or(&Value::Null).to_string())
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> RowData {
        RowData::new(
            "users",
            vec![
                FieldValue::new("id", Value::Int(1)),
                FieldValue::new("Name", Value::String("ann".into())),
                FieldValue::new("email", Value::Null),
            ],
        )
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let row = row();
        assert_eq!(row.get_value("name"), Value::String("ann".into()));
        assert_eq!(row.get_value("EMAIL"), Value::Null);
        assert_eq!(row.get_value("missing"), Value::Null);
    }

    #[test]
    fn test_set_replaces_or_appends() {
        let mut row = row();
        row.set("name", Value::String("bob".into()));
        row.set("age", Value::Int32(30));
        assert_eq!(row.len(), 4);
        assert_eq!(row.get_value("NAME"), Value::String("bob".into()));
        assert_eq!(row.get_value("age"), Value::Int32(30));
    }

    #[test]
    fn test_flat_values() {
        assert_eq!(row().flat_values(), "1|ann|null");
    }
}
