//! Subscription descriptors - what a screen asks to watch.

use std::fmt;

use serde_json::Value;

use crate::change::{ChangeEvent, Operation, RowFilter};
use crate::feed::ChannelTopic;

use super::SubscriptionError;

/// Callback invoked with a change event.
pub type EventCallback = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Callback invoked when a subscription fails for good.
pub type ErrorCallback = Box<dyn Fn(&SubscriptionError) + Send + Sync>;

/// Which operations a descriptor wants delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationFilter {
    #[default]
    Any,
    Insert,
    Update,
    Delete,
}

impl OperationFilter {
    pub fn admits(&self, operation: Operation) -> bool {
        match self {
            OperationFilter::Any => true,
            OperationFilter::Insert => operation == Operation::Insert,
            OperationFilter::Update => operation == Operation::Update,
            OperationFilter::Delete => operation == Operation::Delete,
        }
    }
}

impl From<Operation> for OperationFilter {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Insert => OperationFilter::Insert,
            Operation::Update => OperationFilter::Update,
            Operation::Delete => OperationFilter::Delete,
        }
    }
}

/// The two handler shapes a descriptor may carry.
pub enum Handlers {
    /// One callback for every matching event.
    Generic(EventCallback),
    /// Per-operation callbacks; operations without one are skipped.
    Specific {
        on_insert: Option<EventCallback>,
        on_update: Option<EventCallback>,
        on_delete: Option<EventCallback>,
    },
}

impl Handlers {
    fn empty_specific() -> Self {
        Handlers::Specific {
            on_insert: None,
            on_update: None,
            on_delete: None,
        }
    }

    /// Invoke the handler for `event`. Returns false if none applied.
    pub(crate) fn dispatch(&self, event: &ChangeEvent) -> bool {
        let handler = match self {
            Handlers::Generic(on_event) => Some(on_event),
            Handlers::Specific {
                on_insert,
                on_update,
                on_delete,
            } => match event.operation {
                Operation::Insert => on_insert.as_ref(),
                Operation::Update => on_update.as_ref(),
                Operation::Delete => on_delete.as_ref(),
            },
        };
        match handler {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }

    fn is_empty(&self) -> bool {
        matches!(
            self,
            Handlers::Specific {
                on_insert: None,
                on_update: None,
                on_delete: None,
            }
        )
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handlers::Generic(_) => f.write_str("Generic"),
            Handlers::Specific {
                on_insert,
                on_update,
                on_delete,
            } => f
                .debug_struct("Specific")
                .field("on_insert", &on_insert.is_some())
                .field("on_update", &on_update.is_some())
                .field("on_delete", &on_delete.is_some())
                .finish(),
        }
    }
}

/// A screen's declarative request to watch a table.
///
/// Uses builder pattern. Setting `on_event` switches to the generic shape;
/// setting any of `on_insert`/`on_update`/`on_delete` switches to the
/// specific shape. The last shape set wins.
///
/// ## Example
///
/// ```
/// use view_sync::{RowFilter, SubscriptionDescriptor};
///
/// let descriptor = SubscriptionDescriptor::new("classes")
///     .filter(RowFilter::eq("school_id", 42))
///     .on_event(|event| println!("{} on {}", event.operation, event.table));
/// assert!(descriptor.is_enabled());
/// ```
pub struct SubscriptionDescriptor {
    table: String,
    operation_filter: OperationFilter,
    row_filter: Option<RowFilter>,
    handlers: Handlers,
    enabled: bool,
    on_error: Option<ErrorCallback>,
}

impl SubscriptionDescriptor {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            operation_filter: OperationFilter::Any,
            row_filter: None,
            handlers: Handlers::empty_specific(),
            enabled: true,
            on_error: None,
        }
    }

    pub fn operation(mut self, filter: impl Into<OperationFilter>) -> Self {
        self.operation_filter = filter.into();
        self
    }

    pub fn filter(mut self, filter: RowFilter) -> Self {
        self.row_filter = Some(filter);
        self
    }

    /// Shorthand for `filter(RowFilter::eq(column, value))`.
    pub fn filter_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(RowFilter::eq(column, value))
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn handlers(mut self, handlers: Handlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn on_event<F>(self, handler: F) -> Self
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.handlers(Handlers::Generic(Box::new(handler)))
    }

    pub fn on_insert<F>(self, handler: F) -> Self
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.specific(Operation::Insert, Box::new(handler))
    }

    pub fn on_update<F>(self, handler: F) -> Self
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.specific(Operation::Update, Box::new(handler))
    }

    pub fn on_delete<F>(self, handler: F) -> Self
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.specific(Operation::Delete, Box::new(handler))
    }

    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&SubscriptionError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(handler));
        self
    }

    fn specific(mut self, operation: Operation, handler: EventCallback) -> Self {
        if let Handlers::Generic(_) = self.handlers {
            self.handlers = Handlers::empty_specific();
        }
        if let Handlers::Specific {
            on_insert,
            on_update,
            on_delete,
        } = &mut self.handlers
        {
            let slot = match operation {
                Operation::Insert => on_insert,
                Operation::Update => on_update,
                Operation::Delete => on_delete,
            };
            *slot = Some(handler);
        }
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn operation_filter(&self) -> OperationFilter {
        self.operation_filter
    }

    pub fn row_filter(&self) -> Option<&RowFilter> {
        self.row_filter.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn topic(&self) -> ChannelTopic {
        ChannelTopic {
            table: self.table.clone(),
            filter: self.row_filter.clone(),
        }
    }

    /// Check the descriptor can be subscribed.
    pub fn validate(&self) -> Result<(), SubscriptionError> {
        if self.table.trim().is_empty() {
            return Err(SubscriptionError::InvalidDescriptor(
                "table must not be empty".into(),
            ));
        }
        if let Some(filter) = &self.row_filter {
            if filter.column.trim().is_empty() {
                return Err(SubscriptionError::InvalidDescriptor(format!(
                    "row filter on {} has an empty column",
                    self.table
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn has_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }

    pub(crate) fn into_parts(self) -> DescriptorParts {
        DescriptorParts {
            operation_filter: self.operation_filter,
            handlers: self.handlers,
            on_error: self.on_error,
        }
    }
}

impl fmt::Debug for SubscriptionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionDescriptor")
            .field("table", &self.table)
            .field("operation_filter", &self.operation_filter)
            .field("row_filter", &self.row_filter)
            .field("handlers", &self.handlers)
            .field("enabled", &self.enabled)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// What the dispatcher keeps from a descriptor once its channel is open.
pub(crate) struct DescriptorParts {
    pub(crate) operation_filter: OperationFilter,
    pub(crate) handlers: Handlers,
    pub(crate) on_error: Option<ErrorCallback>,
}
