//! SubscriptionManager - one channel per enabled descriptor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, trace, warn};

use crate::change::ChangeEvent;
use crate::config::{ConfigError, SyncConfig};
use crate::feed::{ChangeFeed, FeedMessage, FeedStream, TransportError};

use super::channel::{ChannelEntry, ChannelId, ChannelInfo, ChannelRegistry, ChannelState};
use super::descriptor::{DescriptorParts, SubscriptionDescriptor};
use super::handle::{Control, SubscriptionHandle};
use super::reconnect::ReconnectPolicy;
use super::SubscriptionError;

/// Maps subscription descriptors to channels on a change feed.
///
/// The feed is the connection context: it is passed in at construction
/// rather than looked up globally, so tests run the manager against
/// [`InMemoryBackend`](crate::InMemoryBackend).
///
/// Each enabled descriptor gets its own channel and dispatcher thread.
/// Events on one channel reach its handlers in the order the backend
/// committed them; nothing is promised across channels.
///
/// The manager does not diff descriptors. When a screen's table, filter or
/// enabled flag changes it must drop the old handle before subscribing the
/// new descriptor; [`resubscribe`](Self::resubscribe) does both in order.
///
/// ## Example
///
/// ```
/// use view_sync::{InMemoryBackend, SubscriptionDescriptor, SubscriptionManager};
///
/// let backend = InMemoryBackend::new();
/// let manager = SubscriptionManager::new(backend.clone());
///
/// let handle = manager
///     .subscribe(SubscriptionDescriptor::new("notifications").on_event(|event| {
///         println!("{} {:?}", event.operation, event.record_id());
///     }))
///     .unwrap();
///
/// handle.unsubscribe();
/// ```
#[derive(Clone)]
pub struct SubscriptionManager {
    feed: Arc<dyn ChangeFeed>,
    config: SyncConfig,
    registry: ChannelRegistry,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionManager {
    /// Create a manager with the default configuration.
    pub fn new(feed: impl ChangeFeed + 'static) -> Self {
        Self::from_shared(Arc::new(feed), SyncConfig::default())
    }

    /// Create a manager with a validated configuration.
    pub fn with_config(
        feed: impl ChangeFeed + 'static,
        config: SyncConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_shared(Arc::new(feed), config))
    }

    fn from_shared(feed: Arc<dyn ChangeFeed>, config: SyncConfig) -> Self {
        Self {
            feed,
            config,
            registry: ChannelRegistry::default(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Open a channel for `descriptor` and start dispatching to its handlers.
    ///
    /// - An empty table name fails immediately.
    /// - A disabled descriptor yields a no-op handle and opens nothing.
    ///
    /// The first connection attempt happens before this returns, so when the
    /// backend is reachable every change committed afterwards is delivered.
    /// A retryable failure leaves the channel `Connecting` and the
    /// dispatcher keeps trying with backoff.
    pub fn subscribe(
        &self,
        descriptor: SubscriptionDescriptor,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        descriptor.validate()?;

        if !descriptor.is_enabled() {
            debug!(table = descriptor.table(), "descriptor disabled; no channel opened");
            return Ok(SubscriptionHandle::noop());
        }
        if !descriptor.has_handlers() {
            debug!(table = descriptor.table(), "descriptor has no handlers");
        }

        let topic = descriptor.topic();
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::SeqCst));

        let initial = match self.feed.open(&topic) {
            Ok(stream) => Some(stream),
            Err(err) if err.is_retryable() => {
                warn!(
                    channel = %id,
                    topic = %topic,
                    error = %err,
                    "initial connect failed; retrying in background"
                );
                None
            }
            Err(err) => return Err(SubscriptionError::Transport(err)),
        };

        let entry = self.registry.register(id, topic.clone());
        if initial.is_some() {
            entry.advance(ChannelState::Open);
        }

        let control = Arc::new(Control::new());
        let (stop_tx, stop_rx) = mpsc::channel();
        let dispatcher = Dispatcher {
            feed: Arc::clone(&self.feed),
            entry: Arc::clone(&entry),
            control: Arc::clone(&control),
            parts: descriptor.into_parts(),
            policy: self.config.reconnect.clone(),
            poll_ms: self.config.poll_interval_ms,
        };

        let worker = thread::Builder::new()
            .name(format!("view-sync-{}", id))
            .spawn(move || dispatcher.run(initial, stop_rx));
        let worker = match worker {
            Ok(worker) => worker,
            Err(err) => {
                entry.set_state(ChannelState::Closed);
                self.registry.remove(&entry);
                return Err(SubscriptionError::Spawn(err.to_string()));
            }
        };

        info!(channel = %id, topic = %topic, "channel subscribed");

        Ok(SubscriptionHandle::active(
            entry,
            control,
            stop_tx,
            worker,
            self.registry.clone(),
        ))
    }

    /// Tear down a subscription. Same as [`SubscriptionHandle::unsubscribe`].
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.unsubscribe();
    }

    /// Replace a subscription after the screen's dependencies changed:
    /// the old channel is closed before the new one is opened.
    pub fn resubscribe(
        &self,
        old: SubscriptionHandle,
        descriptor: SubscriptionDescriptor,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        old.unsubscribe();
        drop(old);
        self.subscribe(descriptor)
    }

    /// Every registered channel, ordered by id.
    pub fn channels(&self) -> Vec<ChannelInfo> {
        self.registry.snapshot()
    }

    /// Channels registered on `table`, ordered by id.
    pub fn channels_for(&self, table: &str) -> Vec<ChannelInfo> {
        self.registry.for_table(table)
    }

    pub fn channel_count(&self) -> usize {
        self.registry.len()
    }
}

enum Reopen {
    Opened(Box<dyn FeedStream>),
    Retry,
    Stop,
}

/// Runs on a subscription's own thread: polls the channel, decodes and
/// filters events, invokes handlers, and reconnects when the connection
/// drops.
struct Dispatcher {
    feed: Arc<dyn ChangeFeed>,
    entry: Arc<ChannelEntry>,
    control: Arc<Control>,
    parts: DescriptorParts,
    policy: ReconnectPolicy,
    poll_ms: u64,
}

impl Dispatcher {
    fn run(self, mut stream: Option<Box<dyn FeedStream>>, stop_rx: Receiver<()>) {
        let mut failures: u32 = 0;

        loop {
            if self.stop_requested(&stop_rx) {
                break;
            }

            let Some(active) = stream.as_mut() else {
                match self.reopen(&mut failures, &stop_rx) {
                    Reopen::Opened(opened) => stream = Some(opened),
                    Reopen::Retry => {}
                    Reopen::Stop => break,
                }
                continue;
            };

            match active.poll(self.poll_ms) {
                Ok(Some(message)) => self.dispatch(message),
                Ok(None) => {}
                Err(err) if err.is_retryable() => {
                    warn!(
                        channel = %self.entry.id,
                        topic = %self.entry.topic,
                        error = %err,
                        "connection lost; reconnecting"
                    );
                    active.close();
                    stream = None;
                    self.entry.advance(ChannelState::Connecting);
                    self.entry.record_reconnect();
                }
                Err(err) => {
                    info!(
                        channel = %self.entry.id,
                        topic = %self.entry.topic,
                        reason = %err,
                        "channel ended by backend"
                    );
                    self.entry.set_state(ChannelState::Closed);
                    self.notify(SubscriptionError::Transport(err));
                    break;
                }
            }
        }

        if let Some(mut stream) = stream {
            stream.close();
        }
        debug!(channel = %self.entry.id, "dispatcher stopped");
    }

    fn stop_requested(&self, stop_rx: &Receiver<()>) -> bool {
        if !self.control.is_wanted() {
            return true;
        }
        matches!(
            stop_rx.try_recv(),
            Ok(()) | Err(TryRecvError::Disconnected)
        )
    }

    fn reopen(&self, failures: &mut u32, stop_rx: &Receiver<()>) -> Reopen {
        self.entry.advance(ChannelState::Connecting);

        match self.feed.open(&self.entry.topic) {
            Ok(mut stream) => {
                // Unsubscribed while the connect was in flight.
                if !self.control.is_wanted() {
                    stream.close();
                    return Reopen::Stop;
                }
                *failures = 0;
                self.entry.advance(ChannelState::Open);
                info!(channel = %self.entry.id, topic = %self.entry.topic, "channel opened");
                Reopen::Opened(stream)
            }
            Err(err) if !err.is_retryable() => {
                error!(
                    channel = %self.entry.id,
                    topic = %self.entry.topic,
                    error = %err,
                    "channel refused"
                );
                self.entry.set_state(ChannelState::Closed);
                self.notify(SubscriptionError::Transport(err));
                Reopen::Stop
            }
            Err(err) => {
                let attempt = *failures;
                *failures += 1;

                if !self.policy.should_retry(attempt) {
                    error!(
                        channel = %self.entry.id,
                        topic = %self.entry.topic,
                        attempts = *failures,
                        error = %err,
                        "giving up on channel"
                    );
                    self.entry.set_state(ChannelState::Closed);
                    self.notify(SubscriptionError::ReconnectExhausted {
                        channel: self.entry.topic.name(),
                        attempts: *failures,
                        last_error: err.to_string(),
                    });
                    return Reopen::Stop;
                }

                let delay = self.policy.backoff_for(attempt);
                warn!(
                    channel = %self.entry.id,
                    attempt = *failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "connect failed; backing off"
                );
                match stop_rx.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => Reopen::Retry,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => Reopen::Stop,
                }
            }
        }
    }

    fn dispatch(&self, message: FeedMessage) {
        let event = match ChangeEvent::from_payload(&message.payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    channel = %self.entry.id,
                    seq = message.seq,
                    error = %err,
                    "dropping malformed change event"
                );
                self.entry.record_dropped();
                return;
            }
        };

        if event.table != self.entry.topic.table {
            warn!(
                channel = %self.entry.id,
                seq = message.seq,
                expected = %self.entry.topic.table,
                table = %event.table,
                "dropping change event for another table"
            );
            self.entry.record_dropped();
            return;
        }

        if !self.parts.operation_filter.admits(event.operation) {
            self.entry.record_filtered();
            return;
        }

        let _gate = self.control.gate();
        if !self.control.is_wanted() {
            return;
        }
        if self.parts.handlers.dispatch(&event) {
            self.entry.record_delivered();
            trace!(
                channel = %self.entry.id,
                seq = message.seq,
                op = %event.operation,
                "dispatched change event"
            );
        } else {
            self.entry.record_filtered();
        }
    }

    fn notify(&self, err: SubscriptionError) {
        let _gate = self.control.gate();
        if !self.control.is_wanted() {
            return;
        }
        if let Some(on_error) = &self.parts.on_error {
            on_error(&err);
        }
    }
}
