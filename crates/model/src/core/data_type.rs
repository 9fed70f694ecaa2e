use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, collections::HashMap, fmt};
use tracing::warn;

/// Parameter type a target SQL column expects at bind time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BindType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Text,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Bytea,
    Inet,
    Interval,
    Json,
    Jsonb,
    Other(String),
}

lazy_static! {
    static ref POSTGRES_TYPE_MAP: HashMap<&'static str, BindType> = build_postgres_type_map();
}

impl BindType {
    /// Resolves a Postgres/YSQL type name (`information_schema` or `pg_type` spelling).
    pub fn from_postgres_type(type_name: &str) -> BindType {
        let normalized = type_name.trim().to_lowercase();
        let base = normalized
            .split_once('(')
            .map(|(head, _)| head.trim())
            .unwrap_or(normalized.as_str());

        POSTGRES_TYPE_MAP
            .get(base)
            .cloned()
            .unwrap_or_else(|| BindType::Other(normalized.clone()))
    }

    pub fn postgres_name(&self) -> Cow<'_, str> {
        match self {
            BindType::Boolean => Cow::Borrowed("boolean"),
            BindType::SmallInt => Cow::Borrowed("smallint"),
            BindType::Integer => Cow::Borrowed("integer"),
            BindType::BigInt => Cow::Borrowed("bigint"),
            BindType::Real => Cow::Borrowed("real"),
            BindType::Double => Cow::Borrowed("double precision"),
            BindType::Numeric => Cow::Borrowed("numeric"),
            BindType::Text => Cow::Borrowed("text"),
            BindType::Uuid => Cow::Borrowed("uuid"),
            BindType::Date => Cow::Borrowed("date"),
            BindType::Time => Cow::Borrowed("time"),
            BindType::Timestamp => Cow::Borrowed("timestamp"),
            BindType::TimestampTz => Cow::Borrowed("timestamptz"),
            BindType::Bytea => Cow::Borrowed("bytea"),
            BindType::Inet => Cow::Borrowed("inet"),
            BindType::Interval => Cow::Borrowed("interval"),
            BindType::Json => Cow::Borrowed("json"),
            BindType::Jsonb => Cow::Borrowed("jsonb"),
            BindType::Other(name) => Cow::Borrowed(name),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, BindType::SmallInt | BindType::Integer | BindType::BigInt)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            BindType::Date | BindType::Time | BindType::Timestamp | BindType::TimestampTz
        )
    }
}

impl fmt::Display for BindType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.postgres_name())
    }
}

fn build_postgres_type_map() -> HashMap<&'static str, BindType> {
    use BindType::*;

    let entries = [
        ("boolean", Boolean),
        ("bool", Boolean),
        ("smallint", SmallInt),
        ("int2", SmallInt),
        ("integer", Integer),
        ("int", Integer),
        ("int4", Integer),
        ("serial", Integer),
        ("bigint", BigInt),
        ("int8", BigInt),
        ("bigserial", BigInt),
        ("real", Real),
        ("float4", Real),
        ("double precision", Double),
        ("float8", Double),
        ("numeric", Numeric),
        ("decimal", Numeric),
        ("text", Text),
        ("varchar", Text),
        ("character varying", Text),
        ("character", Text),
        ("char", Text),
        ("bpchar", Text),
        ("name", Text),
        ("uuid", Uuid),
        ("date", Date),
        ("time", Time),
        ("time without time zone", Time),
        ("timestamp", Timestamp),
        ("timestamp without time zone", Timestamp),
        ("timestamptz", TimestampTz),
        ("timestamp with time zone", TimestampTz),
        ("bytea", Bytea),
        ("inet", Inet),
        ("interval", Interval),
        ("json", Json),
        ("jsonb", Jsonb),
    ];

    entries.into_iter().collect()
}

/// Column type as declared in the origin (wide-column) store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceType {
    Ascii,
    Text,
    Varchar,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Varint,
    Counter,
    Float,
    Double,
    Decimal,
    Boolean,
    Uuid,
    TimeUuid,
    Timestamp,
    Date,
    Time,
    Blob,
    Inet,
    Duration,
    List(Box<SourceType>),
    Set(Box<SourceType>),
    Map(Box<SourceType>, Box<SourceType>),
    Tuple(Vec<SourceType>),
    Frozen(Box<SourceType>),
    Udt(String),
}

impl SourceType {
    /// Parses an origin type declaration such as `map<text, frozen<list<int>>>`.
    ///
    /// Unknown simple names are treated as user-defined types.
    pub fn parse(declared: &str) -> Result<SourceType, String> {
        let declared = declared.trim();
        if declared.is_empty() {
            return Err("Empty type declaration".to_string());
        }

        let lower = declared.to_lowercase();
        if let Some(open) = lower.find('<') {
            if !lower.ends_with('>') {
                return Err(format!("Unbalanced type declaration: {declared}"));
            }
            let head = lower[..open].trim();
            let args = split_type_args(&declared[open + 1..declared.len() - 1])?;
            return match (head, args.as_slice()) {
                ("list", [inner]) => Ok(SourceType::List(Box::new(Self::parse(inner)?))),
                ("set", [inner]) => Ok(SourceType::Set(Box::new(Self::parse(inner)?))),
                ("frozen", [inner]) => Ok(SourceType::Frozen(Box::new(Self::parse(inner)?))),
                ("map", [k, v]) => Ok(SourceType::Map(
                    Box::new(Self::parse(k)?),
                    Box::new(Self::parse(v)?),
                )),
                ("tuple", items) if !items.is_empty() => Ok(SourceType::Tuple(
                    items.iter().map(|t| Self::parse(t)).collect::<Result<_, _>>()?,
                )),
                _ => Err(format!("Unsupported parameterized type: {declared}")),
            };
        }

        let simple = match lower.as_str() {
            "ascii" => SourceType::Ascii,
            "text" => SourceType::Text,
            "varchar" => SourceType::Varchar,
            "tinyint" => SourceType::TinyInt,
            "smallint" => SourceType::SmallInt,
            "int" => SourceType::Int,
            "bigint" => SourceType::BigInt,
            "varint" => SourceType::Varint,
            "counter" => SourceType::Counter,
            "float" => SourceType::Float,
            "double" => SourceType::Double,
            "decimal" => SourceType::Decimal,
            "boolean" => SourceType::Boolean,
            "uuid" => SourceType::Uuid,
            "timeuuid" => SourceType::TimeUuid,
            "timestamp" => SourceType::Timestamp,
            "date" => SourceType::Date,
            "time" => SourceType::Time,
            "blob" => SourceType::Blob,
            "inet" => SourceType::Inet,
            "duration" => SourceType::Duration,
            _ => SourceType::Udt(declared.to_string()),
        };
        Ok(simple)
    }

    /// Strips `frozen<..>` wrappers.
    pub fn unfrozen(&self) -> &SourceType {
        match self {
            SourceType::Frozen(inner) => inner.unfrozen(),
            other => other,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self.unfrozen(),
            SourceType::List(_)
                | SourceType::Set(_)
                | SourceType::Map(_, _)
                | SourceType::Tuple(_)
                | SourceType::Udt(_)
        )
    }

    pub fn is_uuid(&self) -> bool {
        matches!(self.unfrozen(), SourceType::Uuid | SourceType::TimeUuid)
    }

    pub fn is_counter(&self) -> bool {
        matches!(self, SourceType::Counter)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self.unfrozen(),
            SourceType::Timestamp | SourceType::Date | SourceType::Time
        )
    }

    /// Target column type a freshly created SQL table would use for this origin type.
    pub fn target_bind_type(&self) -> BindType {
        match self.unfrozen() {
            SourceType::Ascii | SourceType::Text | SourceType::Varchar => BindType::Text,
            SourceType::TinyInt | SourceType::SmallInt => BindType::SmallInt,
            SourceType::Int => BindType::Integer,
            SourceType::BigInt | SourceType::Counter => BindType::BigInt,
            SourceType::Varint | SourceType::Decimal => BindType::Numeric,
            SourceType::Float => BindType::Real,
            SourceType::Double => BindType::Double,
            SourceType::Boolean => BindType::Boolean,
            SourceType::Uuid | SourceType::TimeUuid => BindType::Uuid,
            SourceType::Timestamp => BindType::Timestamp,
            SourceType::Date => BindType::Date,
            SourceType::Time => BindType::Time,
            SourceType::Blob => BindType::Bytea,
            SourceType::Inet => BindType::Inet,
            SourceType::Duration => BindType::Interval,
            SourceType::List(_)
            | SourceType::Set(_)
            | SourceType::Map(_, _)
            | SourceType::Tuple(_)
            | SourceType::Frozen(_) => BindType::Text,
            SourceType::Udt(name) => {
                warn!(source_type = %name, "No target mapping for origin type, using text");
                BindType::Text
            }
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Ascii => write!(f, "ascii"),
            SourceType::Text => write!(f, "text"),
            SourceType::Varchar => write!(f, "varchar"),
            SourceType::TinyInt => write!(f, "tinyint"),
            SourceType::SmallInt => write!(f, "smallint"),
            SourceType::Int => write!(f, "int"),
            SourceType::BigInt => write!(f, "bigint"),
            SourceType::Varint => write!(f, "varint"),
            SourceType::Counter => write!(f, "counter"),
            SourceType::Float => write!(f, "float"),
            SourceType::Double => write!(f, "double"),
            SourceType::Decimal => write!(f, "decimal"),
            SourceType::Boolean => write!(f, "boolean"),
            SourceType::Uuid => write!(f, "uuid"),
            SourceType::TimeUuid => write!(f, "timeuuid"),
            SourceType::Timestamp => write!(f, "timestamp"),
            SourceType::Date => write!(f, "date"),
            SourceType::Time => write!(f, "time"),
            SourceType::Blob => write!(f, "blob"),
            SourceType::Inet => write!(f, "inet"),
            SourceType::Duration => write!(f, "duration"),
            SourceType::List(t) => write!(f, "list<{t}>"),
            SourceType::Set(t) => write!(f, "set<{t}>"),
            SourceType::Map(k, v) => write!(f, "map<{k}, {v}>"),
            SourceType::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|t| t.to_string()).collect();
                write!(f, "tuple<{}>", parts.join(", "))
            }
            SourceType::Frozen(t) => write!(f, "frozen<{t}>"),
            SourceType::Udt(name) => write!(f, "{name}"),
        }
    }
}

impl TryFrom<&str> for SourceType {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        SourceType::parse(s)
    }
}

/// Splits the top-level comma separated arguments of a parameterized type.
fn split_type_args(args: &str) -> Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, c) in args.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("Unbalanced type arguments: {args}"));
                }
            }
            ',' if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(format!("Unbalanced type arguments: {args}"));
    }
    parts.push(args[start..].trim());

    if parts.iter().any(|p| p.is_empty()) {
        return Err(format!("Empty type argument in: {args}"));
    }
    Ok(parts)
}
