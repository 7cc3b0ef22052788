use std::fmt;

/// Error raised when a change event is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeError {
    /// The payload (or a row inside it) is not a JSON object.
    NotAnObject(&'static str),
    /// A required field is missing or has the wrong type.
    MissingField(&'static str),
    /// The operation tag is not one of INSERT, UPDATE, DELETE.
    UnknownOperation(String),
    /// The old/new rows present do not match what the operation requires.
    ShapeMismatch {
        operation: String,
        has_old: bool,
        has_new: bool,
    },
    /// A row filter expression could not be parsed.
    InvalidFilter(String),
}

impl fmt::Display for ChangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeError::NotAnObject(what) => write!(f, "{} is not a JSON object", what),
            ChangeError::MissingField(field) => write!(f, "missing field: {}", field),
            ChangeError::UnknownOperation(tag) => write!(f, "unknown operation: {}", tag),
            ChangeError::ShapeMismatch {
                operation,
                has_old,
                has_new,
            } => write!(
                f,
                "{} event has invalid shape (old_row present: {}, new_row present: {})",
                operation, has_old, has_new
            ),
            ChangeError::InvalidFilter(expr) => write!(f, "invalid row filter: {}", expr),
        }
    }
}

impl std::error::Error for ChangeError {}
