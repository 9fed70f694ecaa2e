use model::core::data_type::BindType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnMetadata {
    pub name: String,
    pub ordinal: i32,
    pub data_type: BindType,
    /// Type name as the server spells it (`udt_name`), used for explicit casts.
    pub type_name: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
}

impl ColumnMetadata {
    pub fn new(name: &str, ordinal: i32, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            ordinal,
            data_type: BindType::from_postgres_type(type_name),
            type_name: type_name.to_string(),
            is_nullable: true,
            is_primary_key: false,
        }
    }

    /// Types without a native driver binding travel as text and are cast server side.
    pub fn requires_text_cast(&self) -> bool {
        matches!(self.data_type, BindType::Interval | BindType::Other(_))
    }
}
