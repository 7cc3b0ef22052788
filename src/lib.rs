//! Realtime view synchronization for dashboard screens.
//!
//! Screens hold local copies of backend tables and keep them current from
//! the backend's change feed:
//!
//! - [`change`] - change events, rows, ids and row filters
//! - [`feed`] - the change feed transport traits
//! - [`subscription`] - descriptors, the subscription manager and handles
//! - [`reconcile`] - folding events into a local collection
//! - [`data`] - bulk loads and mutations, plus [`InMemoryBackend`]
//! - [`live`] - subscribe, load and reconcile in one [`LiveQuery`]
//! - [`config`] - [`SyncConfig`]
//!
//! The crate logs through `tracing` and never installs a subscriber.

extern crate self as view_sync;

pub mod change;
pub mod config;
pub mod data;
pub mod feed;
pub mod live;
pub mod reconcile;
pub mod subscription;

pub use change::{into_row, ChangeError, ChangeEvent, Operation, RecordId, Row, RowFilter};
pub use config::{ConfigError, SyncConfig};
pub use data::{DataAccess, DataAccessExt, DataError, InMemoryBackend, Mutation};
pub use feed::{ChangeFeed, ChannelTopic, FeedMessage, FeedStream, TransportError};
pub use live::{LiveQuery, LiveQueryError, LiveQueryOptions};
pub use reconcile::{
    apply_event, reconcile, InsertPosition, Outcome, ReconcileError, ReconciledCollection, Record,
    ViewSpec,
};
pub use subscription::{
    ChannelId, ChannelInfo, ChannelState, Handlers, OperationFilter, ReconnectPolicy,
    SubscriptionDescriptor, SubscriptionError, SubscriptionHandle, SubscriptionManager,
    SubscriptionStats,
};

// Derive macro, in the macro namespace alongside the trait.
pub use view_sync_macros::Record;
