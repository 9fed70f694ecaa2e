use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use connectors::sql::base::coercion::{parse_datetime, parse_naive_datetime};
use engine_core::connectors::target::SchemaProvider;
use model::core::{data_type::BindType, value::Value};
use std::{collections::BTreeMap, str::FromStr};
use tracing::{debug, warn};
use uuid::Uuid;

/// Target columns written with a fixed literal instead of the origin value,
/// typed once against the target schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantColumns {
    values: BTreeMap<String, Value>,
}

impl ConstantColumns {
    /// Types each literal by the bind type of its column. Unknown columns and
    /// literals that do not parse are logged and left out.
    pub fn parse(literals: &BTreeMap<String, String>, schema: &dyn SchemaProvider) -> Self {
        let mut values = BTreeMap::new();

        for (column, literal) in literals {
            let Some(bind_type) = schema.bind_type(column) else {
                warn!(column = %column, table = %schema.table_name(), "Constant column is not a target column, ignoring");
                continue;
            };

            match parse_literal(literal, &bind_type) {
                Some(value) => {
                    debug!(column = %column, value = %value, "Constant column configured");
                    values.insert(column.to_lowercase(), value);
                }
                None => {
                    warn!(column = %column, literal = %literal, bind_type = %bind_type, "Constant column literal does not parse, ignoring");
                }
            }
        }

        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(&column.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn unquote(literal: &str) -> &str {
    let literal = literal.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = literal
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    literal
}

/// Parses a configured literal into a value of `bind_type`.
pub fn parse_literal(literal: &str, bind_type: &BindType) -> Option<Value> {
    let raw = unquote(literal);

    let value = match bind_type {
        BindType::SmallInt => Value::SmallInt(raw.parse().ok()?),
        BindType::Integer => Value::Int32(raw.parse().ok()?),
        BindType::BigInt => Value::Int(raw.parse().ok()?),
        BindType::Real => Value::Real(raw.parse().ok()?),
        BindType::Double => Value::Float(raw.parse().ok()?),
        BindType::Numeric => Value::Decimal(BigDecimal::from_str(raw).ok()?),
        BindType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            _ => return None,
        },
        BindType::Timestamp => Value::LocalTimestamp(parse_naive_datetime(raw)?),
        BindType::TimestampTz => Value::Timestamp(parse_datetime(raw)?),
        BindType::Date => Value::Date(NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?),
        BindType::Uuid => Value::Uuid(Uuid::parse_str(raw).ok()?),
        _ => Value::String(raw.to_string()),
    };
    Some(value)
}
