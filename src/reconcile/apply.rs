use crate::change::{ChangeError, ChangeEvent, Operation, RecordId, Row};

use super::record::{decode_row, merge_row, Record};
use super::ReconcileError;

/// Where an INSERT for a new id lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertPosition {
    /// Most-recent-first feeds (notifications, audit logs).
    #[default]
    Prepend,
    /// Catalog lists (classes, students); pair with a sorted view to keep
    /// alphabetical order.
    Append,
}

/// What applying one event did to a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    Updated,
    Deleted,
    /// Duplicate delivery, echo of an applied write, or delete of an absent id.
    Unchanged,
    /// Held until the collection is seeded.
    Buffered,
}

impl Outcome {
    /// Whether the visible collection changed.
    pub fn changed(&self) -> bool {
        matches!(self, Outcome::Inserted | Outcome::Updated | Outcome::Deleted)
    }
}

/// Fold one change event into an ordered list of records.
///
/// - INSERT / UPDATE: merge into the element with the same id in place, or
///   insert at `position` when no element has it.
/// - DELETE: remove the element; no-op when absent.
///
/// ```
/// # use serde::{Deserialize, Serialize};
/// # use serde_json::json;
/// # use view_sync::{into_row, reconcile, ChangeEvent, InsertPosition, Record};
/// #[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Record)]
/// #[record(table = "classes")]
/// struct Class { id: i64, name: String }
///
/// let items = vec![Class { id: 1, name: "CP1".into() }];
/// let event = ChangeEvent::insert("classes", into_row(json!({"id": 2, "name": "CP2"})).unwrap());
/// let items = reconcile(items, &event, InsertPosition::Append).unwrap();
/// assert_eq!(items.len(), 2);
/// ```
pub fn reconcile<T: Record>(
    mut items: Vec<T>,
    event: &ChangeEvent,
    position: InsertPosition,
) -> Result<Vec<T>, ReconcileError> {
    apply_event(&mut items, event, position)?;
    Ok(items)
}

/// In-place form of [`reconcile`].
pub fn apply_event<T: Record>(
    items: &mut Vec<T>,
    event: &ChangeEvent,
    position: InsertPosition,
) -> Result<Outcome, ReconcileError> {
    let id = checked_id::<T>(event)?;
    match event.operation {
        Operation::Insert | Operation::Update => {
            let row = event
                .new_row
                .as_ref()
                .ok_or(ChangeError::MissingField("new_row"))?;
            upsert(items, &id, row, position)
        }
        Operation::Delete => Ok(remove(items, &id)),
    }
}

/// Validate an event against the record type and return the id it touches.
pub(crate) fn checked_id<T: Record>(event: &ChangeEvent) -> Result<RecordId, ReconcileError> {
    if event.table != T::TABLE {
        return Err(ReconcileError::TableMismatch {
            expected: T::TABLE.to_string(),
            actual: event.table.clone(),
        });
    }
    event.validate()?;
    event
        .record_id_in(T::ID_COLUMN)
        .ok_or_else(|| ReconcileError::MissingId {
            table: event.table.clone(),
            column: T::ID_COLUMN.to_string(),
        })
}

pub(crate) fn upsert<T: Record>(
    items: &mut Vec<T>,
    id: &RecordId,
    row: &Row,
    position: InsertPosition,
) -> Result<Outcome, ReconcileError> {
    match index_of(items, id) {
        Some(index) => match merge_row(&items[index], row)? {
            Some(merged) => {
                items[index] = merged;
                Ok(Outcome::Updated)
            }
            None => Ok(Outcome::Unchanged),
        },
        None => {
            let record = decode_row::<T>(row)?;
            insert_at(items, record, position);
            Ok(Outcome::Inserted)
        }
    }
}

pub(crate) fn remove<T: Record>(items: &mut Vec<T>, id: &RecordId) -> Outcome {
    match index_of(items, id) {
        Some(index) => {
            items.remove(index);
            Outcome::Deleted
        }
        None => Outcome::Unchanged,
    }
}

pub(crate) fn insert_at<T>(items: &mut Vec<T>, record: T, position: InsertPosition) {
    match position {
        InsertPosition::Prepend => items.insert(0, record),
        InsertPosition::Append => items.push(record),
    }
}

pub(crate) fn index_of<T: Record>(items: &[T], id: &RecordId) -> Option<usize> {
    items.iter().position(|item| &item.id() == id)
}
