use std::mem;

use tracing::{debug, warn};

use crate::change::{ChangeEvent, Operation, RecordId, Row};

use super::apply::{checked_id, index_of, insert_at, remove, upsert, InsertPosition, Outcome};
use super::record::{decode_row, merge_row, Record};
use super::view::ViewSpec;
use super::ReconcileError;

/// A live change held back until the snapshot arrives.
#[derive(Debug, Clone)]
enum Pending {
    Upsert(Row),
    Deleted,
}

/// A screen's locally held, ordered copy of one table.
///
/// The collection is owned by exactly one screen. Live events go through
/// [`apply`](Self::apply); the initial bulk load goes through
/// [`seed`](Self::seed).
///
/// ## Snapshot / live race
///
/// A screen subscribes before it bulk-loads, so a live event can arrive
/// before the snapshot does. Until `seed` is called such events are
/// buffered per id. `seed` then overlays them on the snapshot: a buffered
/// update wins over the snapshot's older row, a buffered delete removes the
/// record, and ids the snapshot lacks are inserted at the insert position.
/// The snapshot never clobbers newer live data.
///
/// Calling `seed` on an already seeded collection replaces its contents,
/// which is how a periodic full reload is applied.
pub struct ReconciledCollection<T: Record> {
    items: Vec<T>,
    position: InsertPosition,
    view: ViewSpec<T>,
    visible: Vec<usize>,
    seeded: bool,
    pending: Vec<(RecordId, Pending)>,
}

impl<T: Record> ReconciledCollection<T> {
    /// An unseeded collection; live events buffer until [`seed`](Self::seed).
    pub fn new(position: InsertPosition) -> Self {
        Self {
            items: Vec::new(),
            position,
            view: ViewSpec::default(),
            visible: Vec::new(),
            seeded: false,
            pending: Vec::new(),
        }
    }

    /// A seeded collection holding `items`.
    pub fn from_items(items: Vec<T>, position: InsertPosition) -> Self {
        let mut collection = Self::new(position);
        collection.seed(items);
        collection
    }

    pub fn with_view(mut self, view: ViewSpec<T>) -> Self {
        self.set_view(view);
        self
    }

    /// Replace the derived view and recompute it.
    pub fn set_view(&mut self, view: ViewSpec<T>) {
        self.view = view;
        self.refresh_view();
    }

    pub fn position(&self) -> InsertPosition {
        self.position
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Number of ids with buffered live changes.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Every record, in collection order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Records that pass the view's filter, in the view's order.
    pub fn visible(&self) -> Vec<&T> {
        self.visible.iter().map(|&i| &self.items[i]).collect()
    }

    pub fn get(&self, id: &RecordId) -> Option<&T> {
        index_of(&self.items, id).map(|i| &self.items[i])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Fold one live change event into the collection.
    ///
    /// On error the collection is left as it was.
    pub fn apply(&mut self, event: &ChangeEvent) -> Result<Outcome, ReconcileError> {
        let id = checked_id::<T>(event)?;

        if !self.seeded {
            self.buffer(id, event);
            return Ok(Outcome::Buffered);
        }

        let outcome = match event.operation {
            Operation::Delete => remove(&mut self.items, &id),
            Operation::Insert | Operation::Update => match &event.new_row {
                Some(row) => upsert(&mut self.items, &id, row, self.position)?,
                None => Outcome::Unchanged,
            },
        };
        if outcome.changed() {
            self.refresh_view();
        }
        Ok(outcome)
    }

    /// Install the bulk-loaded snapshot, overlaying any buffered live
    /// changes.
    pub fn seed(&mut self, snapshot: Vec<T>) {
        let mut items = snapshot;
        let pending = mem::take(&mut self.pending);
        let overlaid = pending.len();

        for (id, change) in pending {
            match (index_of(&items, &id), change) {
                (Some(index), Pending::Deleted) => {
                    items.remove(index);
                }
                (Some(index), Pending::Upsert(row)) => match merge_row(&items[index], &row) {
                    Ok(Some(merged)) => items[index] = merged,
                    Ok(None) => {}
                    Err(err) => warn!(table = T::TABLE, id = %id, error = %err, "discarding buffered change"),
                },
                (None, Pending::Deleted) => {}
                (None, Pending::Upsert(row)) => match decode_row::<T>(&row) {
                    Ok(record) => insert_at(&mut items, record, self.position),
                    Err(err) => warn!(table = T::TABLE, id = %id, error = %err, "discarding buffered change"),
                },
            }
        }

        debug!(
            table = T::TABLE,
            records = items.len(),
            overlaid,
            "collection seeded"
        );
        self.items = items;
        self.seeded = true;
        self.refresh_view();
    }

    /// Start buffering live events again ahead of a reload. The current
    /// items stay visible until the next [`seed`](Self::seed).
    pub fn begin_reload(&mut self) {
        self.seeded = false;
    }

    fn buffer(&mut self, id: RecordId, event: &ChangeEvent) {
        let slot = self.pending.iter_mut().find(|(pending_id, _)| *pending_id == id);
        let next = match (event.operation, &event.new_row) {
            (Operation::Delete, _) | (_, None) => Pending::Deleted,
            (_, Some(row)) => match slot.as_ref().map(|(_, change)| change) {
                Some(Pending::Upsert(existing)) => {
                    let mut merged = existing.clone();
                    for (column, value) in row {
                        merged.insert(column.clone(), value.clone());
                    }
                    Pending::Upsert(merged)
                }
                _ => Pending::Upsert(row.clone()),
            },
        };
        match slot {
            Some((_, change)) => *change = next,
            None => self.pending.push((id, next)),
        }
    }

    fn refresh_view(&mut self) {
        self.visible = self.view.project(&self.items);
    }
}

impl<T: Record + std::fmt::Debug> std::fmt::Debug for ReconciledCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciledCollection")
            .field("items", &self.items)
            .field("position", &self.position)
            .field("seeded", &self.seeded)
            .field("pending", &self.pending.len())
            .finish()
    }
}
