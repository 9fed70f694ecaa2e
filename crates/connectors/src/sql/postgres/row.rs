use crate::sql::postgres::numeric::PgNumeric;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use std::net::IpAddr;
use tokio_postgres::{
    Row,
    types::{FromSql, Json as PgJson, Type},
};
use tracing::warn;
use uuid::Uuid;

/// Decodes a driver row into a `RowData`, column by column.
pub fn to_row_data(row: &Row, table: &str) -> RowData {
    let fields = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| FieldValue::new(column.name(), decode(row, idx, column.type_())))
        .collect();

    RowData::new(table, fields)
}

fn decode(row: &Row, idx: usize, ty: &Type) -> Value {
    match *ty {
        Type::BOOL => get(row, idx, Value::Boolean),
        Type::INT2 => get(row, idx, Value::SmallInt),
        Type::INT4 => get(row, idx, Value::Int32),
        Type::INT8 => get(row, idx, Value::Int),
        Type::FLOAT4 => get(row, idx, Value::Real),
        Type::FLOAT8 => get(row, idx, Value::Float),
        Type::NUMERIC => get(row, idx, |n: PgNumeric| Value::Decimal(n.0)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => get(row, idx, Value::String),
        Type::UUID => get(row, idx, |u: Uuid| Value::Uuid(u)),
        Type::BYTEA => get(row, idx, Value::Bytes),
        Type::INET => get(row, idx, |ip: IpAddr| Value::Inet(ip)),
        Type::DATE => get(row, idx, |d: NaiveDate| Value::Date(d)),
        Type::TIME => get(row, idx, |t: NaiveTime| Value::Time(t)),
        Type::TIMESTAMP => get(row, idx, |t: NaiveDateTime| Value::LocalTimestamp(t)),
        Type::TIMESTAMPTZ => get(row, idx, |t: DateTime<Utc>| Value::Timestamp(t)),
        Type::JSON | Type::JSONB => get(row, idx, |j: PgJson<serde_json::Value>| Value::Json(j.0)),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(v) => v.map(Value::String).unwrap_or(Value::Null),
            Err(err) => {
                warn!(column = idx, pg_type = %ty, %err, "Unsupported column type, reading as null");
                Value::Null
            }
        },
    }
}

fn get<'a, T, F>(row: &'a Row, idx: usize, wrap: F) -> Value
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => wrap(v),
        Ok(None) => Value::Null,
        Err(err) => {
            warn!(column = idx, %err, "Failed to decode column value");
            Value::Null
        }
    }
}
