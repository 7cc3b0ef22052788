use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::change::{RecordId, Row, DEFAULT_ID_COLUMN};

use super::ReconcileError;

/// A domain record a screen keeps in a reconciled collection.
///
/// Usually derived:
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use view_sync::Record;
///
/// #[derive(Clone, Debug, Serialize, Deserialize, Record)]
/// #[record(table = "classes")]
/// struct Class {
///     id: i64,
///     name: String,
/// }
///
/// let class = Class { id: 1, name: "CP1".into() };
/// assert_eq!(Class::TABLE, "classes");
/// assert_eq!(class.id().as_str(), "1");
/// ```
pub trait Record: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// Backend table the record lives in.
    const TABLE: &'static str;

    /// Row column that carries the id.
    const ID_COLUMN: &'static str = DEFAULT_ID_COLUMN;

    fn id(&self) -> RecordId;
}

/// Decode a full row into a record.
pub fn decode_row<T: Record>(row: &Row) -> Result<T, ReconcileError> {
    serde_json::from_value(Value::Object(row.clone())).map_err(|e| decode_error::<T>(e))
}

/// Shallow-merge `row` over `record`'s fields.
///
/// Columns missing from `row` keep their current values, so partial
/// payloads never blank out fields. Returns `None` when the merge changes
/// nothing.
pub fn merge_row<T: Record>(record: &T, row: &Row) -> Result<Option<T>, ReconcileError> {
    let base = match serde_json::to_value(record).map_err(|e| decode_error::<T>(e))? {
        Value::Object(map) => map,
        _ => {
            return Err(ReconcileError::Decode {
                table: T::TABLE.to_string(),
                message: "record does not serialize to an object".into(),
            })
        }
    };

    let mut merged = base.clone();
    for (column, value) in row {
        merged.insert(column.clone(), value.clone());
    }
    if merged == base {
        return Ok(None);
    }

    serde_json::from_value(Value::Object(merged))
        .map(Some)
        .map_err(|e| decode_error::<T>(e))
}

fn decode_error<T: Record>(err: serde_json::Error) -> ReconcileError {
    ReconcileError::Decode {
        table: T::TABLE.to_string(),
        message: err.to_string(),
    }
}
