//! Channel bookkeeping shared by the manager and its handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::feed::ChannelTopic;

/// Unique identity of one subscribe call's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub(crate) u64);

impl ChannelId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Connection state of a channel, for "reconnecting..." indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Opening, or reopening after a lost connection.
    Connecting,
    Open,
    /// Unsubscribed, closed by the backend, or out of reconnect attempts.
    Closed,
}

impl ChannelState {
    fn to_u8(self) -> u8 {
        match self {
            ChannelState::Connecting => 0,
            ChannelState::Open => 1,
            ChannelState::Closed => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Connecting,
            1 => ChannelState::Open,
            _ => ChannelState::Closed,
        }
    }
}

/// Statistics for one subscription's dispatcher.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Events handed to a handler.
    pub delivered: usize,
    /// Events skipped by the operation filter or with no matching handler.
    pub filtered: usize,
    /// Malformed events that were dropped.
    pub dropped: usize,
    /// Times the channel was reopened after losing its connection.
    pub reconnects: usize,
}

/// Live record of one channel.
pub(crate) struct ChannelEntry {
    pub(crate) id: ChannelId,
    pub(crate) topic: ChannelTopic,
    state: AtomicU8,
    delivered: AtomicUsize,
    filtered: AtomicUsize,
    dropped: AtomicUsize,
    reconnects: AtomicUsize,
}

impl ChannelEntry {
    fn new(id: ChannelId, topic: ChannelTopic) -> Self {
        Self {
            id,
            topic,
            state: AtomicU8::new(ChannelState::Connecting.to_u8()),
            delivered: AtomicUsize::new(0),
            filtered: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: ChannelState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    /// Move to `state` unless the channel is already closed.
    pub(crate) fn advance(&self, state: ChannelState) {
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != ChannelState::Closed.to_u8()).then(|| state.to_u8())
            });
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn info(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.id,
            topic: self.topic.clone(),
            state: self.state(),
        }
    }
}

/// Snapshot of a registered channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub topic: ChannelTopic,
    pub state: ChannelState,
}

/// Table name to the set of channels currently registered on it.
///
/// Entries are keyed by unique channel id, so concurrent subscribe and
/// unsubscribe calls from different screens never touch the same slot.
#[derive(Clone, Default)]
pub(crate) struct ChannelRegistry {
    tables: Arc<RwLock<HashMap<String, HashMap<ChannelId, Arc<ChannelEntry>>>>>,
}

impl ChannelRegistry {
    pub(crate) fn register(&self, id: ChannelId, topic: ChannelTopic) -> Arc<ChannelEntry> {
        let entry = Arc::new(ChannelEntry::new(id, topic));
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables
            .entry(entry.topic.table.clone())
            .or_default()
            .insert(id, Arc::clone(&entry));
        entry
    }

    pub(crate) fn remove(&self, entry: &ChannelEntry) {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        if let Some(channels) = tables.get_mut(&entry.topic.table) {
            channels.remove(&entry.id);
            if channels.is_empty() {
                tables.remove(&entry.topic.table);
            }
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<ChannelInfo> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let mut infos: Vec<ChannelInfo> = tables
            .values()
            .flat_map(|channels| channels.values().map(|entry| entry.info()))
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub(crate) fn for_table(&self, table: &str) -> Vec<ChannelInfo> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let mut infos: Vec<ChannelInfo> = tables
            .get(table)
            .map(|channels| channels.values().map(|entry| entry.info()).collect())
            .unwrap_or_default();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub(crate) fn len(&self) -> usize {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.values().map(HashMap::len).sum()
    }
}
