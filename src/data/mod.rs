//! Data access façade - bulk loads and mutations against the backend.
//!
//! Screens read a table's initial contents with [`DataAccess::bulk_load`]
//! and write through [`DataAccess::mutate`]. Writes are not applied to the
//! local collection directly: the backend's change feed echoes them back,
//! and reconciliation folds the echo in like any other event.
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//! use view_sync::{into_row, DataAccess, InMemoryBackend, Mutation};
//!
//! let backend = InMemoryBackend::new().with_table("classes", Vec::new());
//! backend
//!     .mutate("classes", Mutation::Insert(into_row(json!({"id": 1, "name": "CP1"})).unwrap()))
//!     .unwrap();
//!
//! let rows = backend.bulk_load("classes", None).unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

mod in_memory;

use std::fmt;

use serde_json::Value;

use crate::change::{into_row, Operation, RecordId, Row, RowFilter};
use crate::reconcile::{decode_row, Record};

pub use in_memory::{BulkLoadHook, InMemoryBackend};

/// A single write against one table.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a full row.
    Insert(Row),
    /// Shallow-merge `changes` into the row with `id`.
    Update { id: RecordId, changes: Row },
    /// Remove the row with `id`.
    Delete { id: RecordId },
}

impl Mutation {
    /// The change-event operation this mutation is echoed as.
    pub fn operation(&self) -> Operation {
        match self {
            Mutation::Insert(_) => Operation::Insert,
            Mutation::Update { .. } => Operation::Update,
            Mutation::Delete { .. } => Operation::Delete,
        }
    }
}

/// Error type for data access operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    /// The table does not exist.
    UnknownTable(String),
    /// No row with this id.
    NotFound { table: String, id: String },
    /// A row with this id already exists.
    Conflict { table: String, id: String },
    /// The mutation is not valid for the table.
    Invalid(String),
    /// Serialization/deserialization error.
    Serde(String),
    /// Storage-level error.
    Storage(String),
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::UnknownTable(table) => write!(f, "unknown table: {}", table),
            DataError::NotFound { table, id } => write!(f, "row not found: {}:{}", table, id),
            DataError::Conflict { table, id } => write!(f, "row already exists: {}:{}", table, id),
            DataError::Invalid(msg) => write!(f, "invalid mutation: {}", msg),
            DataError::Serde(msg) => write!(f, "data serialization error: {}", msg),
            DataError::Storage(msg) => write!(f, "data storage error: {}", msg),
        }
    }
}

impl std::error::Error for DataError {}

/// Reads and writes against the backend's tables.
pub trait DataAccess: Send + Sync {
    /// Every row of `table`, narrowed by `filter` when given.
    fn bulk_load(&self, table: &str, filter: Option<&RowFilter>) -> Result<Vec<Row>, DataError>;

    /// Apply one write. Success means the backend committed it; its change
    /// event follows on the feed.
    fn mutate(&self, table: &str, mutation: Mutation) -> Result<(), DataError>;
}

impl<D: DataAccess + ?Sized> DataAccess for std::sync::Arc<D> {
    fn bulk_load(&self, table: &str, filter: Option<&RowFilter>) -> Result<Vec<Row>, DataError> {
        (**self).bulk_load(table, filter)
    }

    fn mutate(&self, table: &str, mutation: Mutation) -> Result<(), DataError> {
        (**self).mutate(table, mutation)
    }
}

/// Typed helpers on any [`DataAccess`].
pub trait DataAccessExt: DataAccess {
    /// Bulk-load `T`'s table and decode every row.
    fn bulk_load_records<T: Record>(&self, filter: Option<&RowFilter>) -> Result<Vec<T>, DataError> {
        self.bulk_load(T::TABLE, filter)?
            .iter()
            .map(|row| decode_row::<T>(row).map_err(|e| DataError::Serde(e.to_string())))
            .collect()
    }

    /// Insert a record into its table.
    fn insert_record<T: Record>(&self, record: &T) -> Result<(), DataError> {
        let value = serde_json::to_value(record).map_err(|e| DataError::Serde(e.to_string()))?;
        let row = into_row(value).map_err(|e| DataError::Serde(e.to_string()))?;
        self.mutate(T::TABLE, Mutation::Insert(row))
    }

    /// Merge `changes` into the record with `id` in `T`'s table.
    fn update_record<T: Record>(&self, id: impl Into<RecordId>, changes: Value) -> Result<(), DataError> {
        let changes = into_row(changes).map_err(|e| DataError::Invalid(e.to_string()))?;
        self.mutate(
            T::TABLE,
            Mutation::Update {
                id: id.into(),
                changes,
            },
        )
    }

    /// Delete the record with `id` from `T`'s table.
    fn delete_record<T: Record>(&self, id: impl Into<RecordId>) -> Result<(), DataError> {
        self.mutate(T::TABLE, Mutation::Delete { id: id.into() })
    }
}

impl<D: DataAccess + ?Sized> DataAccessExt for D {}
