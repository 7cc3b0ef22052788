//! Change events - the atomic unit delivered by a table's change feed.
//!
//! A [`ChangeEvent`] says that one row of one table was inserted, updated,
//! or deleted. It is a plain value: the subscription layer decodes it from
//! the backend's realtime payload and hands it to whichever handlers a
//! screen registered; reconcilers fold it into their local collections.
//!
//! ## Shape
//!
//! | operation | `old_row` | `new_row` |
//! |-----------|-----------|-----------|
//! | INSERT    | `None`    | `Some`    |
//! | UPDATE    | `Some`    | `Some`    |
//! | DELETE    | `Some`    | `None`    |
//!
//! The constructors only build valid shapes; [`ChangeEvent::validate`]
//! checks events that arrive from elsewhere.

mod error;
mod event;
mod filter;
mod row;

pub use error::ChangeError;
pub use event::{ChangeEvent, Operation};
pub use filter::RowFilter;
pub use row::{into_row, RecordId, Row, DEFAULT_ID_COLUMN};
