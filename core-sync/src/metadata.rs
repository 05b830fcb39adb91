//! Local column to remote metadata key mapping.

use bridge_traits::SongMetadata;
use core_library::repositories::LocalValue;
use core_library::SqlIdent;
use serde_json::Value;

/// Conversion applied to a local value before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTransform {
    Identity,
    /// Player rating (-1 unrated, 0-100) to the remote 0/1/5 scale
    Rating,
}

impl ValueTransform {
    pub fn apply(self, value: &LocalValue) -> Value {
        match self {
            ValueTransform::Identity => value.to_json(),
            ValueTransform::Rating => match value.as_i64() {
                Some(-1) => Value::from(0),
                Some(r) if (0..50).contains(&r) => Value::from(1),
                Some(_) => Value::from(5),
                None => value.to_json(),
            },
        }
    }
}

/// One local column and the remote key it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataMapping {
    pub column: SqlIdent,
    pub remote_key: String,
    pub transform: ValueTransform,
}

impl MetadataMapping {
    pub fn new(column: SqlIdent, remote_key: impl Into<String>) -> Self {
        Self {
            column,
            remote_key: remote_key.into(),
            transform: ValueTransform::Identity,
        }
    }

    pub fn with_transform(mut self, transform: ValueTransform) -> Self {
        self.transform = transform;
        self
    }
}

/// Columns to read, in mapping order.
pub fn columns(mappings: &[MetadataMapping]) -> Vec<SqlIdent> {
    mappings.iter().map(|m| m.column.clone()).collect()
}

/// Build the remote metadata from `(column, value)` pairs read for
/// `mappings`. Columns without a mapping are ignored.
pub fn to_remote(mappings: &[MetadataMapping], values: &[(SqlIdent, LocalValue)]) -> SongMetadata {
    let mut metadata = SongMetadata::new();
    for (column, value) in values {
        if let Some(mapping) = mappings.iter().find(|m| &m.column == column) {
            metadata.insert(mapping.remote_key.clone(), mapping.transform.apply(value));
        }
    }
    metadata
}
