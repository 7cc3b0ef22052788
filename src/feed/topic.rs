use std::fmt;

use crate::change::{ChangeEvent, RowFilter};

/// What a channel listens to: one table, optionally narrowed by a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTopic {
    pub table: String,
    pub filter: Option<RowFilter>,
}

impl ChannelTopic {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Channel name as the backend knows it: `realtime:{table}` or
    /// `realtime:{table}:{filter}`.
    pub fn name(&self) -> String {
        match &self.filter {
            Some(filter) => format!("realtime:{}:{}", self.table, filter),
            None => format!("realtime:{}", self.table),
        }
    }

    /// Whether an event belongs on this channel.
    pub fn admits(&self, event: &ChangeEvent) -> bool {
        event.table == self.table
            && self
                .filter
                .as_ref()
                .map(|filter| filter.matches(event))
                .unwrap_or(true)
    }
}

impl fmt::Display for ChannelTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
