use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use model::core::{
    data_type::{BindType, SourceType},
    value::Value,
};
use std::net::IpAddr;
use tracing::warn;
use uuid::Uuid;

/// Converts an origin value into the representation the target column binds.
///
/// The result variant always matches `target` except for the final text
/// fallback, which is logged as a data-fidelity warning and still written.
pub fn convert(value: &Value, source: Option<&SourceType>, target: &BindType) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    if value.is_collection() || source.is_some_and(SourceType::is_collection) {
        return match target {
            BindType::Json | BindType::Jsonb => Value::Json(value.to_json()),
            _ => Value::String(value.to_string()),
        };
    }

    if matches!(target, BindType::Uuid) || source.is_some_and(SourceType::is_uuid) {
        if let Some(converted) = coerce_uuid(value, target) {
            return converted;
        }
    }

    if target.is_temporal() {
        if let Some(converted) = coerce_temporal(value, source, target) {
            return converted;
        }
    }

    if target.is_integer() {
        if let Some(converted) = coerce_integer(value, target) {
            return converted;
        }
    }

    if satisfies(value, target) {
        return value.clone();
    }

    if let Some(converted) = coerce_scalar(value, target) {
        return converted;
    }

    warn!(
        from = value.kind(),
        to = %target,
        source_type = ?source,
        "No conversion available, binding value as text"
    );
    Value::String(value.to_string())
}

/// True when the runtime variant is exactly what the target column binds.
fn satisfies(value: &Value, target: &BindType) -> bool {
    matches!(
        (value, target),
        (Value::Boolean(_), BindType::Boolean)
            | (Value::SmallInt(_), BindType::SmallInt)
            | (Value::Int32(_), BindType::Integer)
            | (Value::Int(_), BindType::BigInt)
            | (Value::Real(_), BindType::Real)
            | (Value::Float(_), BindType::Double)
            | (Value::Decimal(_), BindType::Numeric)
            | (Value::String(_), BindType::Text)
            | (Value::Uuid(_), BindType::Uuid)
            | (Value::Bytes(_), BindType::Bytea)
            | (Value::Inet(_), BindType::Inet)
            | (Value::Date(_), BindType::Date)
            | (Value::Time(_), BindType::Time)
            | (Value::LocalTimestamp(_), BindType::Timestamp)
            | (Value::Timestamp(_), BindType::TimestampTz)
            | (Value::Json(_), BindType::Json | BindType::Jsonb)
    )
}

fn coerce_uuid(value: &Value, target: &BindType) -> Option<Value> {
    let uuid = match value {
        Value::Uuid(u) => *u,
        Value::String(s) => Uuid::parse_str(s.trim()).ok()?,
        Value::Bytes(b) => Uuid::from_slice(b).ok()?,
        _ => return None,
    };

    match target {
        BindType::Uuid => Some(Value::Uuid(uuid)),
        BindType::Text | BindType::Other(_) | BindType::Interval => {
            Some(Value::String(uuid.to_string()))
        }
        _ => None,
    }
}

fn coerce_temporal(value: &Value, source: Option<&SourceType>, target: &BindType) -> Option<Value> {
    if matches!(target, BindType::Time) {
        return coerce_time(value).map(Value::Time);
    }

    let instant = match value {
        Value::Timestamp(ts) => *ts,
        Value::SystemTime(st) => DateTime::<Utc>::from(*st),
        Value::LocalTimestamp(ts) => ts.and_utc(),
        Value::Date(d) => d.and_hms_opt(0, 0, 0)?.and_utc(),
        // Epoch millis only count as temporal when the origin says so or the target is a timestamp
        Value::Int(ms) if is_timestamp_hint(source, target) => DateTime::from_timestamp_millis(*ms)?,
        Value::Int32(days) if matches!(source, Some(SourceType::Date)) => {
            NaiveDate::from_num_days_from_ce_opt(719_163i32.checked_add(*days)?)?
                .and_hms_opt(0, 0, 0)?
                .and_utc()
        }
        Value::String(s) => parse_datetime(s.trim())?,
        _ => return None,
    };

    match target {
        BindType::Timestamp => Some(Value::LocalTimestamp(instant.naive_utc())),
        BindType::TimestampTz => Some(Value::Timestamp(instant)),
        BindType::Date => Some(Value::Date(instant.date_naive())),
        _ => None,
    }
}

fn is_timestamp_hint(source: Option<&SourceType>, target: &BindType) -> bool {
    matches!(source, Some(SourceType::Timestamp))
        || matches!(target, BindType::Timestamp | BindType::TimestampTz)
}

fn coerce_time(value: &Value) -> Option<NaiveTime> {
    match value {
        Value::Time(t) => Some(*t),
        // Origin time values are nanoseconds since midnight
        Value::Int(nanos) if *nanos >= 0 => {
            let secs = u32::try_from(nanos / 1_000_000_000).ok()?;
            let frac = u32::try_from(nanos % 1_000_000_000).ok()?;
            NaiveTime::from_num_seconds_from_midnight_opt(secs, frac)
        }
        Value::Timestamp(ts) => Some(ts.time()),
        Value::LocalTimestamp(ts) => Some(ts.time()),
        Value::String(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").ok(),
        _ => None,
    }
}

/// Narrows any integer-valued input to the width of the target column.
fn coerce_integer(value: &Value, target: &BindType) -> Option<Value> {
    let wide = match value {
        Value::Varint(v) => i64::try_from(v).ok()?,
        Value::SmallInt(_) | Value::Int32(_) | Value::Int(_) | Value::Boolean(_) => {
            value.as_i64()?
        }
        Value::Decimal(_) | Value::Float(_) | Value::Real(_) | Value::String(_) => value.as_i64()?,
        _ => return None,
    };

    let narrowed = match target {
        BindType::SmallInt => Value::SmallInt(i16::try_from(wide).ok()?),
        BindType::Integer => Value::Int32(i32::try_from(wide).ok()?),
        BindType::BigInt => Value::Int(wide),
        _ => return None,
    };
    Some(narrowed)
}

fn coerce_scalar(value: &Value, target: &BindType) -> Option<Value> {
    match target {
        BindType::Real => value.as_f64().map(|v| Value::Real(v as f32)),
        BindType::Double => value.as_f64().map(Value::Float),
        BindType::Numeric => value.as_big_decimal().map(Value::Decimal),
        BindType::Boolean => value.as_bool().map(Value::Boolean),
        BindType::Text | BindType::Interval | BindType::Other(_) => {
            Some(Value::String(value.to_string()))
        }
        BindType::Bytea => match value {
            Value::String(s) => Some(Value::Bytes(s.as_bytes().to_vec())),
            _ => None,
        },
        BindType::Inet => match value {
            Value::String(s) => s.trim().parse::<IpAddr>().ok().map(Value::Inet),
            _ => None,
        },
        BindType::Json | BindType::Jsonb => match value {
            Value::String(s) => Some(Value::Json(
                serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.clone())),
            )),
            other => Some(Value::Json(other.to_json())),
        },
        _ => None,
    }
}

/// Parses the timestamp layouts accepted from text values and constant columns.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    parse_naive_datetime(raw).map(|naive| naive.and_utc())
}

pub fn parse_naive_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.strip_suffix('Z').unwrap_or(raw);
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
