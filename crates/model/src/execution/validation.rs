use crate::core::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One differing column between origin and target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDiff {
    pub column: String,
    pub origin: Value,
    pub target: Value,
}

impl fmt::Display for ColumnDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Column {}: Origin='{}' Target='{}'",
            self.column, self.origin, self.target
        )
    }
}

/// Classification of a single record during validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid,
    Mismatched { diffs: Vec<ColumnDiff> },
    Missing,
    Error { message: String },
}

impl ValidationOutcome {
    /// Human readable diff list, empty for anything but `Mismatched`.
    pub fn details(&self) -> String {
        match self {
            ValidationOutcome::Mismatched { diffs } => diffs
                .iter()
                .map(ColumnDiff::to_string)
                .collect::<Vec<_>>()
                .join("; "),
            _ => String::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ValidationOutcome::Valid => "VALID",
            ValidationOutcome::Mismatched { .. } => "MISMATCHED",
            ValidationOutcome::Missing => "MISSING",
            ValidationOutcome::Error { .. } => "ERROR",
        }
    }
}

/// Values compare equal when both are absent or their text forms match.
pub fn values_match(origin: &Value, target: &Value) -> bool {
    match (origin, target) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (a, b) => a == b || a.to_string() == b.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_joined() {
        let outcome = ValidationOutcome::Mismatched {
            diffs: vec![
                ColumnDiff {
                    column: "name".into(),
                    origin: Value::String("a".into()),
                    target: Value::String("b".into()),
                },
                ColumnDiff {
                    column: "age".into(),
                    origin: Value::Int(1),
                    target: Value::Null,
                },
            ],
        };

        assert_eq!(
            outcome.details(),
            "Column name: Origin='a' Target='b'; Column age: Origin='1' Target='null'"
        );
        assert_eq!(outcome.label(), "MISMATCHED");
        assert_eq!(ValidationOutcome::Missing.details(), "");
    }

    #[test]
    fn test_values_match_by_text() {
        assert!(values_match(&Value::Int32(5), &Value::Int(5)));
        assert!(values_match(&Value::Null, &Value::Null));
        assert!(!values_match(&Value::Null, &Value::String("null".into())));
        assert!(!values_match(&Value::Float(1.5), &Value::Float(1.25)));
    }
}
