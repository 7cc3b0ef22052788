//! Reconciliation - folding change events into a screen's local collection.
//!
//! A screen keeps an ordered list of [`Record`]s. Live [`ChangeEvent`]s are
//! folded into it so that its contents converge to what a fresh bulk load
//! would return:
//!
//! - INSERT / UPDATE of a known id merges the new row into the element in
//!   place, so duplicate deliveries and echoes of the screen's own writes
//!   change nothing
//! - INSERT / UPDATE of an unknown id decodes and inserts the row at the
//!   collection's [`InsertPosition`]
//! - DELETE removes the element, or does nothing when the id is absent
//!
//! [`reconcile`] and [`apply_event`] are the bare functions;
//! [`ReconciledCollection`] adds the snapshot/live race handling and a
//! derived [`ViewSpec`] that is recomputed after every change.
//!
//! [`ChangeEvent`]: crate::ChangeEvent

mod apply;
mod collection;
mod error;
mod record;
mod view;

pub use apply::{apply_event, reconcile, InsertPosition, Outcome};
pub use collection::ReconciledCollection;
pub use error::ReconcileError;
pub use record::{decode_row, merge_row, Record};
pub use view::ViewSpec;
