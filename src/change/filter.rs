use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChangeError, ChangeEvent, Row};

/// Equality predicate `column = value` scoping a channel to a subset of a
/// table, e.g. `school_id = 42`.
///
/// The backend evaluates the filter before dispatch. Scalars compare by
/// their textual form, so a filter parsed from `school_id=eq.42` matches
/// both `42` and `"42"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub value: Value,
}

impl RowFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Parse the channel filter syntax `column=eq.value`.
    pub fn parse(expr: &str) -> Result<Self, ChangeError> {
        let (column, rest) = expr
            .split_once('=')
            .ok_or_else(|| ChangeError::InvalidFilter(expr.to_string()))?;
        let raw = rest
            .strip_prefix("eq.")
            .ok_or_else(|| ChangeError::InvalidFilter(expr.to_string()))?;
        let column = column.trim();
        if column.is_empty() {
            return Err(ChangeError::InvalidFilter(expr.to_string()));
        }

        let value = serde_json::from_str::<Value>(raw)
            .ok()
            .filter(|v| !v.is_object() && !v.is_array())
            .unwrap_or_else(|| Value::String(raw.to_string()));

        Ok(Self::eq(column, value))
    }

    pub fn matches_row(&self, row: &Row) -> bool {
        row.get(&self.column)
            .map(|value| scalar_eq(value, &self.value))
            .unwrap_or(false)
    }

    /// Whether the event's current row (new row, or old row for deletes)
    /// satisfies the filter.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event
            .current_row()
            .map(|row| self.matches_row(row))
            .unwrap_or(false)
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::String(s) => write!(f, "{}=eq.{}", self.column, s),
            other => write!(f, "{}=eq.{}", self.column, other),
        }
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (scalar_text(a), scalar_text(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
