use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    hash::{Hash, Hasher},
    net::IpAddr,
    time::SystemTime,
};
use uuid::Uuid;

/// A single column value as read from the origin store or bound to the target.
///
/// Temporal values come in the three shapes origin drivers hand out: an
/// epoch instant (`Timestamp`), a legacy date object (`SystemTime`) and a
/// plain epoch-millis integer, which arrives as `Int` and is only recognised
/// as temporal through the column's source type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    SmallInt(i16),
    Int32(i32),
    Int(i64),
    Varint(BigInt),
    Real(f32),
    Float(f64),
    Decimal(BigDecimal),
    String(String),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    Inet(IpAddr),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    LocalTimestamp(NaiveDateTime),
    SystemTime(SystemTime),
    Json(serde_json::Value),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tuple(Vec<Value>),
    Udt(Vec<(String, Value)>),
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Value::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Null => {}
            Boolean(v) => v.hash(state),
            SmallInt(v) => v.hash(state),
            Int32(v) => v.hash(state),
            Int(v) => v.hash(state),
            Varint(v) => v.hash(state),
            // Hash the bits so NaN and -0.0 stay stable
            Real(v) => v.to_bits().hash(state),
            Float(v) => v.to_bits().hash(state),
            Decimal(v) => v.hash(state),
            String(v) => v.hash(state),
            Uuid(v) => v.hash(state),
            Bytes(v) => v.hash(state),
            Inet(v) => v.hash(state),
            Date(v) => v.hash(state),
            Time(v) => v.hash(state),
            Timestamp(v) => v.hash(state),
            LocalTimestamp(v) => v.hash(state),
            SystemTime(v) => v.hash(state),
            Json(v) => serde_json::to_string(v).unwrap_or_default().hash(state),
            List(v) | Set(v) | Tuple(v) => v.hash(state),
            Map(v) => v.hash(state),
            Udt(v) => v.hash(state),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Value::List(_) | Value::Set(_) | Value::Map(_) | Value::Tuple(_) | Value::Udt(_)
        )
    }

    /// Short name of the runtime variant, used in log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::SmallInt(_) => "smallint",
            Value::Int32(_) => "int",
            Value::Int(_) => "bigint",
            Value::Varint(_) => "varint",
            Value::Real(_) => "real",
            Value::Float(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::Bytes(_) => "bytes",
            Value::Inet(_) => "inet",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::LocalTimestamp(_) => "local_timestamp",
            Value::SystemTime(_) => "system_time",
            Value::Json(_) => "json",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Tuple(_) => "tuple",
            Value::Udt(_) => "udt",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(*v),
            Value::Varint(v) => i64::try_from(v).ok(),
            Value::Decimal(v) if v.is_integer() => v.to_i64(),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Boolean(v) => Some(i64::from(*v)),
            Value::String(v) => v.trim().parse().ok(),
            Value::Json(v) => v.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::SmallInt(v) => Some(f64::from(*v)),
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int(v) => Some(*v as f64),
            Value::Varint(v) => v.to_f64(),
            Value::Real(v) => Some(f64::from(*v)),
            Value::Float(v) => Some(*v),
            Value::Decimal(v) => v.to_f64(),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::String(v) => v.trim().parse().ok(),
            Value::Json(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_big_decimal(&self) -> Option<BigDecimal> {
        match self {
            Value::SmallInt(v) => Some(BigDecimal::from(*v)),
            Value::Int32(v) => Some(BigDecimal::from(*v)),
            Value::Int(v) => Some(BigDecimal::from(*v)),
            Value::Varint(v) => Some(BigDecimal::new(v.clone(), 0)),
            Value::Real(v) => BigDecimal::from_f32(*v),
            Value::Float(v) => BigDecimal::from_f64(*v),
            Value::Decimal(v) => Some(v.clone()),
            Value::String(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            Value::SmallInt(v) => Some(*v != 0),
            Value::Int32(v) => Some(*v != 0),
            Value::Int(v) => Some(*v != 0),
            Value::String(v) => match v.trim().to_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Some(true),
                "false" | "f" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Json(v) => v.as_bool(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Flat JSON form used when a composite value has to land in a text column.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Boolean(v) => Json::Bool(*v),
            Value::SmallInt(v) => Json::from(*v),
            Value::Int32(v) => Json::from(*v),
            Value::Int(v) => Json::from(*v),
            Value::Real(v) => serde_json::Number::from_f64(f64::from(*v))
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Json(v) => v.clone(),
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
                Json::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => {
                let mut object = serde_json::Map::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = match k {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    object.insert(key, v.to_json());
                }
                Json::Object(object)
            }
            Value::Udt(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(name, v)| (name.clone(), v.to_json()))
                    .collect(),
            ),
            other => Json::String(other.to_string()),
        }
    }

    /// Epoch instant for the temporal variants.
    pub fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(v) => Some(*v),
            Value::LocalTimestamp(v) => Some(v.and_utc()),
            Value::SystemTime(v) => Some(DateTime::<Utc>::from(*v)),
            Value::Date(v) => v.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::SmallInt(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Varint(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Uuid(v) => write!(f, "{v}"),
            Value::Bytes(v) => {
                write!(f, "0x")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Value::Inet(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{v}"),
            Value::Time(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::LocalTimestamp(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::SystemTime(v) => write!(
                f,
                "{}",
                DateTime::<Utc>::from(*v).to_rfc3339_opts(SecondsFormat::AutoSi, true)
            ),
            Value::Json(v) => write!(f, "{v}"),
            Value::List(_) | Value::Set(_) | Value::Map(_) | Value::Tuple(_) | Value::Udt(_) => {
                write!(f, "{}", self.to_json())
            }
        }
    }
}

/// A named column value inside a row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldValue {
    pub name: String,
    pub value: Option<Value>,
}

impl FieldValue {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        let value = match value {
            Value::Null => None,
            other => Some(other),
        };
        Self {
            name: name.into(),
            value,
        }
    }
}
