use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ChangeError;

/// A row as delivered by the backend: column name to JSON value.
pub type Row = Map<String, Value>;

/// Column that carries a row's identity unless a record says otherwise.
pub const DEFAULT_ID_COLUMN: &str = "id";

/// Convert a JSON value into a [`Row`]. Fails unless the value is an object.
pub fn into_row(value: Value) -> Result<Row, ChangeError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ChangeError::NotAnObject("row")),
    }
}

/// Identity of a record within its table.
///
/// Backends hand out integer keys for some tables and uuid strings for
/// others; both are normalized to their string form so `5` and `"5"` name
/// the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Read an id from a JSON value. Only strings and numbers are ids.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Read the id stored under `column` in a row.
    pub fn from_row(row: &Row, column: &str) -> Option<Self> {
        row.get(column).and_then(Self::from_value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}
