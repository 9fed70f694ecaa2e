use crate::core::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered primary key of a target row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl PrimaryKey {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// A key is usable only when every component is present.
    pub fn is_valid(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|v| !v.is_null())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(c, v)| format!("{c}={v}")).collect();
        write!(f, "({})", parts.join(", "))
    }
}
