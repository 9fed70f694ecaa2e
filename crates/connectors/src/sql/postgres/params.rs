use crate::sql::postgres::numeric::PgNumeric;
use bytes::BytesMut;
use model::core::value::Value;
use std::error::Error;
use tokio_postgres::types::{IsNull, Json as PgJson, ToSql, Type, to_sql_checked};

/// SQL NULL that binds to a placeholder of any type.
#[derive(Debug)]
struct SqlNull;

impl ToSql for SqlNull {
    fn to_sql(&self, _ty: &Type, _out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

pub struct PgParam(Box<dyn ToSql + Sync + Send>);

impl PgParam {
    /// Wraps an already converted value; the variant decides the wire type.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => PgParam(Box::new(SqlNull)),
            Value::Boolean(v) => PgParam(Box::new(v)),
            Value::SmallInt(v) => PgParam(Box::new(v)),
            Value::Int32(v) => PgParam(Box::new(v)),
            Value::Int(v) => PgParam(Box::new(v)),
            Value::Real(v) => PgParam(Box::new(v)),
            Value::Float(v) => PgParam(Box::new(v)),
            Value::Decimal(v) => PgParam(Box::new(PgNumeric::from(v))),
            Value::Varint(v) => PgParam(Box::new(PgNumeric::from(v))),
            Value::String(v) => PgParam(Box::new(v)),
            Value::Uuid(v) => PgParam(Box::new(v)),
            Value::Bytes(v) => PgParam(Box::new(v)),
            Value::Inet(v) => PgParam(Box::new(v)),
            Value::Date(v) => PgParam(Box::new(v)),
            Value::Time(v) => PgParam(Box::new(v)),
            Value::Timestamp(v) => PgParam(Box::new(v)),
            Value::LocalTimestamp(v) => PgParam(Box::new(v)),
            Value::SystemTime(v) => PgParam(Box::new(v)),
            Value::Json(v) => PgParam(Box::new(PgJson(v))),
            other @ (Value::List(_)
            | Value::Set(_)
            | Value::Map(_)
            | Value::Tuple(_)
            | Value::Udt(_)) => PgParam(Box::new(other.to_string())),
        }
    }
}

impl AsRef<dyn ToSql + Sync> for PgParam {
    fn as_ref(&self) -> &(dyn ToSql + Sync + 'static) {
        &*self.0
    }
}

pub struct PgParamStore {
    pub params: Vec<PgParam>,
}

impl PgParamStore {
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            params: values.into_iter().map(PgParam::from_value).collect(),
        }
    }

    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|param| param.as_ref())
            .collect::<Vec<_>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::base::coercion::convert;
    use model::core::data_type::{BindType, SourceType};
    use num_bigint::BigInt;
    use tokio_postgres::types::FromSql;

    #[test]
    fn huge_varint_binds_every_digit() {
        let varint = Value::Varint(BigInt::from(10).pow(30) + 7);
        let converted = convert(&varint, Some(&SourceType::Varint), &BindType::Numeric);

        let param = PgParam::from_value(converted);
        let mut out = BytesMut::new();
        let bound = param.as_ref().to_sql_checked(&Type::NUMERIC, &mut out).unwrap();

        assert!(matches!(bound, IsNull::No));
        let decoded = PgNumeric::from_sql(&Type::NUMERIC, &out).unwrap();
        assert_eq!(decoded, PgNumeric::from(BigInt::from(10).pow(30) + 7));
    }

    #[test]
    fn null_binds_to_any_type() {
        let param = PgParam::from_value(Value::Null);
        let mut out = BytesMut::new();
        let bound = param.as_ref().to_sql_checked(&Type::INT8, &mut out).unwrap();
        assert!(matches!(bound, IsNull::Yes));
    }
}
