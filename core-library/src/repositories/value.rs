use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, TypeInfo, ValueRef};

/// A dynamically typed column value read from the local library.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl LocalValue {
    /// Decode column `index` according to the stored value's type.
    pub(crate) fn decode(row: &SqliteRow, index: usize) -> Result<Self, sqlx::Error> {
        let type_name = {
            let raw = row.try_get_raw(index)?;
            if raw.is_null() {
                return Ok(LocalValue::Null);
            }
            raw.type_info().name().to_ascii_uppercase()
        };

        match type_name.as_str() {
            "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => row.try_get(index).map(LocalValue::Integer),
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => row.try_get(index).map(LocalValue::Real),
            "BLOB" => row.try_get(index).map(LocalValue::Blob),
            _ => row.try_get(index).map(LocalValue::Text),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LocalValue::Integer(v) => Some(*v),
            LocalValue::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// JSON rendering; blobs have no JSON form and become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            LocalValue::Null | LocalValue::Blob(_) => Value::Null,
            LocalValue::Integer(v) => Value::from(*v),
            LocalValue::Real(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            LocalValue::Text(v) => Value::String(v.clone()),
        }
    }
}
