//! Live queries - a screen's whole mount sequence in one value.
//!
//! Mounting a [`LiveQuery`] subscribes to the record's table, bulk-loads it,
//! and seeds a [`ReconciledCollection`] that the subscription keeps current.
//! Subscribing first means nothing committed during the load is missed;
//! the collection's buffering makes sure the snapshot cannot overwrite a
//! newer live change. Dropping the query unsubscribes.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//! use view_sync::{
//!     into_row, DataAccessExt, InMemoryBackend, LiveQuery, LiveQueryOptions, Record,
//!     SubscriptionManager,
//! };
//!
//! #[derive(Clone, Debug, Serialize, Deserialize, Record)]
//! #[record(table = "classes")]
//! struct Class { id: i64, name: String }
//!
//! let backend = InMemoryBackend::new()
//!     .with_table("classes", vec![into_row(json!({"id": 1, "name": "CP1"})).unwrap()]);
//! let manager = SubscriptionManager::new(backend.clone());
//!
//! let classes = LiveQuery::<Class>::mount(&manager, &backend, LiveQueryOptions::new()).unwrap();
//! assert_eq!(classes.len(), 1);
//!
//! backend.insert_record(&Class { id: 2, name: "CE1".into() }).unwrap();
//! # let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
//! # while classes.len() < 2 && std::time::Instant::now() < deadline {
//! #     std::thread::sleep(std::time::Duration::from_millis(5));
//! # }
//! assert_eq!(classes.len(), 2);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::change::{RecordId, RowFilter};
use crate::data::{DataAccess, DataAccessExt, DataError};
use crate::reconcile::{InsertPosition, ReconcileError, ReconciledCollection, Record, ViewSpec};
use crate::subscription::{
    ChannelState, ErrorCallback, SubscriptionDescriptor, SubscriptionError, SubscriptionHandle,
    SubscriptionManager,
};

/// Error mounting or reloading a live query.
#[derive(Debug)]
pub enum LiveQueryError {
    Subscription(SubscriptionError),
    Data(DataError),
    Reconcile(ReconcileError),
}

impl fmt::Display for LiveQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveQueryError::Subscription(e) => write!(f, "subscription error: {}", e),
            LiveQueryError::Data(e) => write!(f, "data error: {}", e),
            LiveQueryError::Reconcile(e) => write!(f, "reconcile error: {}", e),
        }
    }
}

impl std::error::Error for LiveQueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LiveQueryError::Subscription(e) => Some(e),
            LiveQueryError::Data(e) => Some(e),
            LiveQueryError::Reconcile(e) => Some(e),
        }
    }
}

impl From<SubscriptionError> for LiveQueryError {
    fn from(e: SubscriptionError) -> Self {
        LiveQueryError::Subscription(e)
    }
}

impl From<DataError> for LiveQueryError {
    fn from(e: DataError) -> Self {
        LiveQueryError::Data(e)
    }
}

impl From<ReconcileError> for LiveQueryError {
    fn from(e: ReconcileError) -> Self {
        LiveQueryError::Reconcile(e)
    }
}

/// How a [`LiveQuery`] loads and presents its table.
pub struct LiveQueryOptions<T> {
    filter: Option<RowFilter>,
    position: InsertPosition,
    view: ViewSpec<T>,
    enabled: bool,
    on_error: Option<ErrorCallback>,
}

impl<T> Default for LiveQueryOptions<T> {
    fn default() -> Self {
        Self {
            filter: None,
            position: InsertPosition::default(),
            view: ViewSpec::default(),
            enabled: true,
            on_error: None,
        }
    }
}

impl<T> LiveQueryOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Narrow both the bulk load and the subscription.
    pub fn filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn position(mut self, position: InsertPosition) -> Self {
        self.position = position;
        self
    }

    pub fn view(mut self, view: ViewSpec<T>) -> Self {
        self.view = view;
        self
    }

    /// A disabled query still loads once but opens no channel.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&SubscriptionError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(handler));
        self
    }
}

struct Shared<T: Record> {
    collection: Mutex<ReconciledCollection<T>>,
    version: AtomicU64,
    rejected: AtomicUsize,
}

impl<T: Record> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, ReconciledCollection<T>> {
        self.collection.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }
}

/// A mounted screen's live, reconciled copy of one table.
pub struct LiveQuery<T: Record> {
    shared: Arc<Shared<T>>,
    handle: SubscriptionHandle,
    filter: Option<RowFilter>,
}

impl<T: Record> LiveQuery<T> {
    /// Subscribe to `T::TABLE`, bulk-load it, and seed the collection.
    ///
    /// If the load fails the subscription is torn down before the error is
    /// returned.
    pub fn mount<D>(
        manager: &SubscriptionManager,
        data: &D,
        options: LiveQueryOptions<T>,
    ) -> Result<Self, LiveQueryError>
    where
        D: DataAccess + ?Sized,
    {
        let LiveQueryOptions {
            filter,
            position,
            view,
            enabled,
            on_error,
        } = options;

        let shared = Arc::new(Shared {
            collection: Mutex::new(ReconciledCollection::new(position).with_view(view)),
            version: AtomicU64::new(0),
            rejected: AtomicUsize::new(0),
        });

        let sink = Arc::clone(&shared);
        let mut descriptor = SubscriptionDescriptor::new(T::TABLE)
            .enabled(enabled)
            .on_event(move |event| {
                let outcome = sink.lock().apply(event);
                match outcome {
                    Ok(outcome) if outcome.changed() => sink.bump(),
                    Ok(_) => {}
                    Err(err) => {
                        sink.rejected.fetch_add(1, Ordering::Relaxed);
                        warn!(table = T::TABLE, error = %err, "change event not applied");
                    }
                }
            });
        if let Some(filter) = &filter {
            descriptor = descriptor.filter(filter.clone());
        }
        if let Some(on_error) = on_error {
            descriptor = descriptor.on_error(on_error);
        }

        let handle = manager.subscribe(descriptor)?;
        let query = Self {
            shared,
            handle,
            filter,
        };

        let records = data.bulk_load_records::<T>(query.filter.as_ref())?;
        query.install(records);
        debug!(table = T::TABLE, records = query.len(), "live query mounted");
        Ok(query)
    }

    /// Bulk-load again and replace the collection, keeping any live change
    /// that lands while the load is in flight.
    pub fn reload<D>(&self, data: &D) -> Result<(), LiveQueryError>
    where
        D: DataAccess + ?Sized,
    {
        self.shared.lock().begin_reload();
        match data.bulk_load_records::<T>(self.filter.as_ref()) {
            Ok(records) => {
                self.install(records);
                Ok(())
            }
            Err(err) => {
                // Put the collection back in live mode with what it had.
                let mut collection = self.shared.lock();
                let current = collection.items().to_vec();
                collection.seed(current);
                Err(err.into())
            }
        }
    }

    fn install(&self, records: Vec<T>) {
        self.shared.lock().seed(records);
        self.shared.bump();
    }

    /// Every record, in collection order.
    pub fn items(&self) -> Vec<T> {
        self.shared.lock().items().to_vec()
    }

    /// Records passing the view's filter, in the view's order.
    pub fn visible(&self) -> Vec<T> {
        self.shared
            .lock()
            .visible()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &RecordId) -> Option<T> {
        self.shared.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().is_empty()
    }

    /// Run `f` against the collection without cloning it.
    pub fn with_collection<R>(&self, f: impl FnOnce(&ReconciledCollection<T>) -> R) -> R {
        f(&self.shared.lock())
    }

    /// Increments whenever the collection changes. Screens compare it to
    /// decide when to re-render.
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::SeqCst)
    }

    /// Live events that could not be applied.
    pub fn rejected(&self) -> usize {
        self.shared.rejected.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ChannelState {
        self.handle.state()
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Stop receiving changes. The collection keeps its last contents.
    pub fn unmount(&self) {
        self.handle.unsubscribe();
    }
}

impl<T: Record> fmt::Debug for LiveQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveQuery")
            .field("table", &T::TABLE)
            .field("records", &self.len())
            .field("version", &self.version())
            .field("handle", &self.handle)
            .finish()
    }
}
