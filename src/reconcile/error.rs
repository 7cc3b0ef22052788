use std::fmt;

use crate::change::ChangeError;

/// Error folding a change event into a collection.
///
/// None of these are raised for ordinary conflicts: duplicate inserts,
/// updates for unknown ids and deletes for absent ids are all defined
/// outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// The event belongs to a different table than the collection.
    TableMismatch { expected: String, actual: String },
    /// The event's rows do not carry the record's id column.
    MissingId { table: String, column: String },
    /// The event's shape is invalid for its operation.
    Malformed(ChangeError),
    /// A row could not be decoded into the record type.
    Decode { table: String, message: String },
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::TableMismatch { expected, actual } => write!(
                f,
                "event for table {} applied to collection of {}",
                actual, expected
            ),
            ReconcileError::MissingId { table, column } => {
                write!(f, "{} event has no {} column", table, column)
            }
            ReconcileError::Malformed(err) => write!(f, "malformed event: {}", err),
            ReconcileError::Decode { table, message } => {
                write!(f, "cannot decode {} row: {}", table, message)
            }
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ChangeError> for ReconcileError {
    fn from(err: ChangeError) -> Self {
        ReconcileError::Malformed(err)
    }
}
