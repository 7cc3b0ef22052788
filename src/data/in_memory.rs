//! InMemoryBackend - tables, change feed and fault injection in one process.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::change::{ChangeEvent, RecordId, Row, RowFilter, DEFAULT_ID_COLUMN};
use crate::feed::{ChangeFeed, ChannelTopic, FeedMessage, FeedStream, TransportError};

use super::{DataAccess, DataError, Mutation};

/// Called with the table name after a bulk load has taken its snapshot and
/// before the rows are returned.
pub type BulkLoadHook = Arc<dyn Fn(&str) + Send + Sync>;

struct Table {
    id_column: String,
    rows: Vec<Row>,
}

struct LogEntry {
    table: String,
    /// `None` for raw payloads, which skip row filters.
    event: Option<ChangeEvent>,
    message: FeedMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamStatus {
    Live,
    Dropped,
    Closed,
}

struct StreamSlot {
    topic: ChannelTopic,
    status: StreamStatus,
    /// Absolute log position of the next entry to read.
    cursor: u64,
}

fn admits(topic: &ChannelTopic, entry: &LogEntry) -> bool {
    if entry.table != topic.table {
        return false;
    }
    match &entry.event {
        Some(event) => topic.admits(event),
        None => true,
    }
}

#[derive(Default)]
struct BackendState {
    tables: HashMap<String, Table>,
    /// Entries not yet read by every live stream; `log[0]` sits at
    /// absolute position `log_base`.
    log: VecDeque<LogEntry>,
    log_base: u64,
    streams: HashMap<u64, StreamSlot>,
    next_stream: u64,
    refuse_connects: usize,
    offline: bool,
}

impl BackendState {
    fn log_end(&self) -> u64 {
        self.log_base + self.log.len() as u64
    }

    fn push(&mut self, table: String, event: Option<ChangeEvent>, payload: Value) {
        let seq = self.log_end() + 1;
        self.log.push_back(LogEntry {
            table,
            event,
            message: FeedMessage::new(seq, payload),
        });
        self.compact();
    }

    /// Next admitted message for stream `id`, advancing its cursor past
    /// everything it skipped.
    fn next_message(&mut self, id: u64) -> Option<FeedMessage> {
        let end = self.log_end();
        let slot = self.streams.get_mut(&id)?;
        let mut cursor = slot.cursor.max(self.log_base);
        let mut found = None;
        while cursor < end {
            let entry = &self.log[(cursor - self.log_base) as usize];
            cursor += 1;
            if admits(&slot.topic, entry) {
                found = Some(entry.message.clone());
                break;
            }
        }
        slot.cursor = cursor;
        found
    }

    /// Evict entries every live stream has read past.
    fn compact(&mut self) {
        let end = self.log_end();
        let floor = self
            .streams
            .values()
            .filter(|slot| slot.status == StreamStatus::Live)
            .map(|slot| slot.cursor)
            .min()
            .unwrap_or(end)
            .clamp(self.log_base, end);
        self.log.drain(..(floor - self.log_base) as usize);
        self.log_base = floor;
    }
}

struct Shared {
    state: Mutex<BackendState>,
    signal: Condvar,
    bulk_load_hook: Mutex<Option<BulkLoadHook>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// In-process backend for tests and local development.
///
/// Implements both [`DataAccess`] and [`ChangeFeed`] over the same tables.
/// Every successful mutation appends its change event to a shared log;
/// each open stream reads the log from the position it was opened at, so
/// nothing committed before `open` is replayed.
///
/// Features:
/// - Thread-safe and `Clone` (clones share state)
/// - Streams honour their topic's table and row filter
/// - Fault injection: dropped connections, refused connects, offline mode,
///   channels closed by the backend, raw payloads
///
/// ## Example
///
/// ```
/// use serde_json::json;
/// use view_sync::{
///     into_row, ChangeFeed, ChannelTopic, DataAccess, FeedStream, InMemoryBackend, Mutation,
/// };
///
/// let backend = InMemoryBackend::new().with_table("classes", Vec::new());
/// let mut stream = backend.open(&ChannelTopic::new("classes")).unwrap();
///
/// backend
///     .mutate("classes", Mutation::Insert(into_row(json!({"id": 1})).unwrap()))
///     .unwrap();
///
/// let message = stream.poll(100).unwrap().unwrap();
/// assert_eq!(message.payload["eventType"], "INSERT");
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    shared: Arc<Shared>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BackendState::default()),
                signal: Condvar::new(),
                bulk_load_hook: Mutex::new(None),
            }),
        }
    }

    /// Builder form of [`create_table`](Self::create_table) plus
    /// [`seed_rows`](Self::seed_rows).
    pub fn with_table(self, table: &str, rows: Vec<Row>) -> Self {
        self.create_table(table, DEFAULT_ID_COLUMN);
        self.seed_rows(table, rows);
        self
    }

    /// Create an empty table keyed by `id_column`. Existing tables are kept.
    pub fn create_table(&self, table: &str, id_column: &str) {
        let mut state = self.shared.lock();
        state.tables.entry(table.to_string()).or_insert_with(|| Table {
            id_column: id_column.to_string(),
            rows: Vec::new(),
        });
    }

    /// Append rows directly, without publishing change events.
    pub fn seed_rows(&self, table: &str, rows: Vec<Row>) {
        let mut state = self.shared.lock();
        let table = state
            .tables
            .entry(table.to_string())
            .or_insert_with(|| Table {
                id_column: DEFAULT_ID_COLUMN.to_string(),
                rows: Vec::new(),
            });
        table.rows.extend(rows);
    }

    /// Current rows of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.shared
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Number of live streams open on `table`.
    pub fn open_streams(&self, table: &str) -> usize {
        self.shared
            .lock()
            .streams
            .values()
            .filter(|slot| slot.topic.table == table && slot.status == StreamStatus::Live)
            .count()
    }

    /// Number of payloads published so far.
    pub fn published(&self) -> usize {
        self.shared.lock().log_end() as usize
    }

    /// Number of payloads still held for streams that have not read them.
    pub fn retained(&self) -> usize {
        self.shared.lock().log.len()
    }

    /// Publish a change event without touching the tables.
    pub fn publish(&self, event: ChangeEvent) {
        let table = event.table.clone();
        let payload = event.to_payload();
        self.append(table, Some(event), payload);
    }

    /// Publish an arbitrary payload on `table`'s channels, bypassing row
    /// filters. Used to exercise malformed-event handling.
    pub fn inject_raw(&self, table: &str, payload: Value) {
        self.append(table.to_string(), None, payload);
    }

    /// Sever every live stream; the next poll on each reports a lost
    /// connection.
    pub fn drop_connections(&self) {
        let mut state = self.shared.lock();
        let mut dropped = 0;
        for slot in state.streams.values_mut() {
            if slot.status == StreamStatus::Live {
                slot.status = StreamStatus::Dropped;
                dropped += 1;
            }
        }
        drop(state);
        debug!(dropped, "dropped connections");
        self.shared.signal.notify_all();
    }

    /// Close every stream on `table` from the backend side.
    pub fn close_channels(&self, table: &str) {
        let mut state = self.shared.lock();
        for slot in state.streams.values_mut() {
            if slot.topic.table == table {
                slot.status = StreamStatus::Closed;
            }
        }
        drop(state);
        self.shared.signal.notify_all();
    }

    /// Fail the next `count` connection attempts.
    pub fn refuse_connects(&self, count: usize) {
        self.shared.lock().refuse_connects = count;
    }

    /// While offline, connects fail and bulk loads and mutations error.
    pub fn set_offline(&self, offline: bool) {
        self.shared.lock().offline = offline;
    }

    /// Install a hook that runs inside every bulk load, after the snapshot
    /// is taken. Lets tests commit changes in the snapshot/live gap.
    pub fn on_bulk_load<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self
            .shared
            .bulk_load_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(hook));
    }

    pub fn clear_bulk_load_hook(&self) {
        *self
            .shared
            .bulk_load_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn append(&self, table: String, event: Option<ChangeEvent>, payload: Value) {
        self.shared.lock().push(table, event, payload);
        self.shared.signal.notify_all();
    }

    fn apply_mutation(state: &mut BackendState, table: &str, mutation: Mutation) -> Result<ChangeEvent, DataError> {
        let stored = state
            .tables
            .get_mut(table)
            .ok_or_else(|| DataError::UnknownTable(table.to_string()))?;
        let id_column = stored.id_column.clone();

        match mutation {
            Mutation::Insert(mut row) => {
                let id = match RecordId::from_row(&row, &id_column) {
                    Some(id) => id,
                    None => {
                        let id = next_numeric_id(&stored.rows, &id_column);
                        row.insert(id_column.clone(), Value::from(id));
                        RecordId::from(id)
                    }
                };
                if position_of(&stored.rows, &id_column, &id).is_some() {
                    return Err(DataError::Conflict {
                        table: table.to_string(),
                        id: id.to_string(),
                    });
                }
                stored.rows.push(row.clone());
                Ok(ChangeEvent::insert(table, row))
            }
            Mutation::Update { id, changes } => {
                let index = position_of(&stored.rows, &id_column, &id).ok_or_else(|| DataError::NotFound {
                    table: table.to_string(),
                    id: id.to_string(),
                })?;
                if let Some(value) = changes.get(&id_column) {
                    if RecordId::from_value(value).as_ref() != Some(&id) {
                        return Err(DataError::Invalid(format!(
                            "update may not change {}.{}",
                            table, id_column
                        )));
                    }
                }
                let old = stored.rows[index].clone();
                let row = &mut stored.rows[index];
                for (column, value) in changes {
                    row.insert(column, value);
                }
                Ok(ChangeEvent::update(table, old, row.clone()))
            }
            Mutation::Delete { id } => {
                let index = position_of(&stored.rows, &id_column, &id).ok_or_else(|| DataError::NotFound {
                    table: table.to_string(),
                    id: id.to_string(),
                })?;
                let old = stored.rows.remove(index);
                Ok(ChangeEvent::delete(table, old))
            }
        }
    }
}

fn position_of(rows: &[Row], id_column: &str, id: &RecordId) -> Option<usize> {
    rows.iter()
        .position(|row| RecordId::from_row(row, id_column).as_ref() == Some(id))
}

fn next_numeric_id(rows: &[Row], id_column: &str) -> i64 {
    rows.iter()
        .filter_map(|row| row.get(id_column).and_then(Value::as_i64))
        .max()
        .unwrap_or(0)
        + 1
}

impl DataAccess for InMemoryBackend {
    fn bulk_load(&self, table: &str, filter: Option<&RowFilter>) -> Result<Vec<Row>, DataError> {
        let rows = {
            let state = self
                .shared
                .state
                .lock()
                .map_err(|_| DataError::Storage("lock poisoned".into()))?;
            if state.offline {
                return Err(DataError::Storage("backend offline".into()));
            }
            let stored = state
                .tables
                .get(table)
                .ok_or_else(|| DataError::UnknownTable(table.to_string()))?;
            stored
                .rows
                .iter()
                .filter(|row| filter.map(|f| f.matches_row(row)).unwrap_or(true))
                .cloned()
                .collect::<Vec<_>>()
        };

        let hook = self
            .shared
            .bulk_load_hook
            .lock()
            .map_err(|_| DataError::Storage("lock poisoned".into()))?
            .clone();
        if let Some(hook) = hook {
            hook(table);
        }

        debug!(table, rows = rows.len(), "bulk load");
        Ok(rows)
    }

    fn mutate(&self, table: &str, mutation: Mutation) -> Result<(), DataError> {
        let operation = mutation.operation();
        let id = {
            let mut state = self
                .shared
                .state
                .lock()
                .map_err(|_| DataError::Storage("lock poisoned".into()))?;
            if state.offline {
                return Err(DataError::Storage("backend offline".into()));
            }
            let event = Self::apply_mutation(&mut state, table, mutation)?;
            let id = event.record_id();
            // Logged under the same lock as the commit so the feed keeps commit order.
            let payload = event.to_payload();
            state.push(table.to_string(), Some(event), payload);
            id
        };
        self.shared.signal.notify_all();
        debug!(table, op = %operation, id = ?id, "mutation committed");
        Ok(())
    }
}

impl ChangeFeed for InMemoryBackend {
    fn open(&self, topic: &ChannelTopic) -> Result<Box<dyn FeedStream>, TransportError> {
        let mut state = self.shared.lock();
        if state.offline {
            return Err(TransportError::ConnectionFailed("backend offline".into()));
        }
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(TransportError::ConnectionFailed("connection refused".into()));
        }

        state.next_stream += 1;
        let id = state.next_stream;
        let cursor = state.log_end();
        state.streams.insert(
            id,
            StreamSlot {
                topic: topic.clone(),
                status: StreamStatus::Live,
                cursor,
            },
        );

        Ok(Box::new(InMemoryStream {
            shared: Arc::clone(&self.shared),
            id,
            closed: false,
        }))
    }
}

struct InMemoryStream {
    shared: Arc<Shared>,
    id: u64,
    closed: bool,
}

impl FeedStream for InMemoryStream {
    fn poll(&mut self, timeout_ms: u64) -> Result<Option<FeedMessage>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut state = self.shared.lock();

        loop {
            match state.streams.get(&self.id).map(|slot| slot.status) {
                Some(StreamStatus::Live) => {}
                Some(StreamStatus::Dropped) => {
                    return Err(TransportError::Disconnected("connection dropped".into()))
                }
                Some(StreamStatus::Closed) | None => return Err(TransportError::Closed),
            }

            if let Some(message) = state.next_message(self.id) {
                return Ok(Some(message));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self
                .shared
                .signal
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.shared.lock();
        state.streams.remove(&self.id);
        state.compact();
    }
}

impl Drop for InMemoryStream {
    fn drop(&mut self) {
        self.close();
    }
}
