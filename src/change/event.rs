use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::row::{RecordId, Row, DEFAULT_ID_COLUMN};
use super::ChangeError;

/// The kind of write that produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }

    /// Parse from the tags change feeds use.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "INSERT" | "insert" | "I" => Some(Operation::Insert),
            "UPDATE" | "update" | "U" => Some(Operation::Update),
            "DELETE" | "delete" | "D" => Some(Operation::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification that one row of a watched table changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Table the row belongs to (e.g. "students", "classes").
    pub table: String,
    pub operation: Operation,
    /// Row before the write. Absent for inserts.
    pub old_row: Option<Row>,
    /// Row after the write. Absent for deletes.
    pub new_row: Option<Row>,
    /// Backend commit time, when the feed reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<String>,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, new_row: Row) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Insert,
            old_row: None,
            new_row: Some(new_row),
            commit_timestamp: None,
        }
    }

    pub fn update(table: impl Into<String>, old_row: Row, new_row: Row) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Update,
            old_row: Some(old_row),
            new_row: Some(new_row),
            commit_timestamp: None,
        }
    }

    pub fn delete(table: impl Into<String>, old_row: Row) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Delete,
            old_row: Some(old_row),
            new_row: None,
            commit_timestamp: None,
        }
    }

    pub fn with_commit_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.commit_timestamp = Some(timestamp.into());
        self
    }

    /// Check that the rows present match the operation.
    pub fn validate(&self) -> Result<(), ChangeError> {
        let has_old = self.old_row.is_some();
        let has_new = self.new_row.is_some();
        let valid = match self.operation {
            Operation::Insert => !has_old && has_new,
            Operation::Update => has_old && has_new,
            Operation::Delete => has_old && !has_new,
        };
        if valid {
            Ok(())
        } else {
            Err(ChangeError::ShapeMismatch {
                operation: self.operation.to_string(),
                has_old,
                has_new,
            })
        }
    }

    /// The row that describes the record's current state: `new_row` for
    /// inserts and updates, `old_row` for deletes.
    pub fn current_row(&self) -> Option<&Row> {
        match self.operation {
            Operation::Delete => self.old_row.as_ref(),
            Operation::Insert | Operation::Update => self.new_row.as_ref(),
        }
    }

    /// Id of the affected record, read from the `id` column.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id_in(DEFAULT_ID_COLUMN)
    }

    /// Id of the affected record, read from `column`. Falls back to the old
    /// row when the current row does not carry it.
    pub fn record_id_in(&self, column: &str) -> Option<RecordId> {
        self.current_row()
            .and_then(|row| RecordId::from_row(row, column))
            .or_else(|| {
                self.old_row
                    .as_ref()
                    .and_then(|row| RecordId::from_row(row, column))
            })
    }

    /// Decode a realtime payload as sent by the backend:
    ///
    /// ```json
    /// {
    ///   "table": "classes",
    ///   "eventType": "UPDATE",
    ///   "new": { "id": 1, "name": "CP1-A" },
    ///   "old": { "id": 1 },
    ///   "commit_timestamp": "2024-09-01T08:00:00Z"
    /// }
    /// ```
    ///
    /// `type`, `record` and `old_record` are accepted as aliases. The feed
    /// sends `{}` for the row an operation does not use; that is read as
    /// absent.
    pub fn from_payload(payload: &Value) -> Result<Self, ChangeError> {
        let obj = payload
            .as_object()
            .ok_or(ChangeError::NotAnObject("payload"))?;

        let table = obj
            .get("table")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or(ChangeError::MissingField("table"))?;

        let tag = obj
            .get("eventType")
            .or_else(|| obj.get("type"))
            .and_then(Value::as_str)
            .ok_or(ChangeError::MissingField("eventType"))?;
        let operation =
            Operation::from_tag(tag).ok_or_else(|| ChangeError::UnknownOperation(tag.to_string()))?;

        let new_row = read_row(obj.get("new").or_else(|| obj.get("record")), "new")?;
        let old_row = read_row(obj.get("old").or_else(|| obj.get("old_record")), "old")?;

        let (old_row, new_row) = match operation {
            Operation::Insert => (old_row.filter(|r| !r.is_empty()), new_row),
            Operation::Update => (old_row, new_row),
            Operation::Delete => (old_row, new_row.filter(|r| !r.is_empty())),
        };

        let event = Self {
            table: table.to_string(),
            operation,
            old_row,
            new_row,
            commit_timestamp: obj
                .get("commit_timestamp")
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        event.validate()?;
        Ok(event)
    }

    /// Encode in the realtime payload shape accepted by [`from_payload`].
    ///
    /// [`from_payload`]: ChangeEvent::from_payload
    pub fn to_payload(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("table".into(), Value::String(self.table.clone()));
        obj.insert(
            "eventType".into(),
            Value::String(self.operation.as_str().to_string()),
        );
        obj.insert(
            "new".into(),
            Value::Object(self.new_row.clone().unwrap_or_default()),
        );
        obj.insert(
            "old".into(),
            Value::Object(self.old_row.clone().unwrap_or_default()),
        );
        if let Some(ts) = &self.commit_timestamp {
            obj.insert("commit_timestamp".into(), Value::String(ts.clone()));
        }
        Value::Object(obj)
    }
}

fn read_row(value: Option<&Value>, field: &'static str) -> Result<Option<Row>, ChangeError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(ChangeError::NotAnObject(field)),
    }
}
