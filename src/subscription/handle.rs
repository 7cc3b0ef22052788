use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tracing::info;

use crate::feed::ChannelTopic;

use super::channel::{ChannelEntry, ChannelId, ChannelRegistry, ChannelState, SubscriptionStats};

thread_local! {
    /// Set while this thread holds some subscription's gate.
    static IN_GATE: Cell<bool> = const { Cell::new(false) };
}

/// A held dispatch gate. Marks the current thread as inside a callback.
pub(crate) struct Gate<'a> {
    _guard: MutexGuard<'a, ()>,
    outer: bool,
}

impl Drop for Gate<'_> {
    fn drop(&mut self) {
        IN_GATE.with(|flag| flag.set(self.outer));
    }
}

fn in_gate() -> bool {
    IN_GATE.with(Cell::get)
}

/// Cancellation state shared by a handle and its dispatcher.
///
/// Handlers only run while holding `gate` and after seeing `wanted` set.
/// `unsubscribe` clears `wanted` and then takes the gate once, so when it
/// returns no handler is running and none will start.
pub(crate) struct Control {
    wanted: AtomicBool,
    gate: Mutex<()>,
}

impl Control {
    pub(crate) fn new() -> Self {
        Self {
            wanted: AtomicBool::new(true),
            gate: Mutex::new(()),
        }
    }

    pub(crate) fn is_wanted(&self) -> bool {
        self.wanted.load(Ordering::SeqCst)
    }

    /// Returns true for the call that actually cancelled.
    fn cancel(&self) -> bool {
        self.wanted.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn gate(&self) -> Gate<'_> {
        let guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        let outer = IN_GATE.with(|flag| flag.replace(true));
        Gate {
            _guard: guard,
            outer,
        }
    }
}

struct ActiveSubscription {
    entry: Arc<ChannelEntry>,
    control: Arc<Control>,
    stop_tx: Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    registry: ChannelRegistry,
}

/// Handle to a subscription. `unsubscribe()` or drop to tear it down.
///
/// A handle for a disabled descriptor is a no-op: it owns no channel and
/// unsubscribing it does nothing.
pub struct SubscriptionHandle {
    inner: Option<ActiveSubscription>,
}

impl SubscriptionHandle {
    pub(crate) fn noop() -> Self {
        Self { inner: None }
    }

    pub(crate) fn active(
        entry: Arc<ChannelEntry>,
        control: Arc<Control>,
        stop_tx: Sender<()>,
        worker: JoinHandle<()>,
        registry: ChannelRegistry,
    ) -> Self {
        let worker_id = worker.thread().id();
        Self {
            inner: Some(ActiveSubscription {
                entry,
                control,
                stop_tx,
                worker: Mutex::new(Some(worker)),
                worker_id,
                registry,
            }),
        }
    }

    /// Close the channel and stop dispatching.
    ///
    /// Idempotent. Safe while the dispatcher is reconnecting and after the
    /// backend already closed the channel. Once this returns, none of the
    /// descriptor's callbacks will run again. May be called from inside one
    /// of this subscription's own handlers.
    ///
    /// Called from inside any subscription's callback, it does not wait for
    /// a callback of this subscription that is already running, nor for its
    /// dispatcher thread to exit; no new callback starts either way. This
    /// keeps two handlers that unsubscribe each other from deadlocking.
    pub fn unsubscribe(&self) {
        let Some(active) = &self.inner else {
            return;
        };
        if !active.control.cancel() {
            return;
        }

        let in_callback = thread::current().id() == active.worker_id || in_gate();
        if !in_callback {
            // Wait out a handler that is mid-flight.
            drop(active.control.gate());
        }

        let _ = active.stop_tx.send(());
        active.entry.set_state(ChannelState::Closed);
        active.registry.remove(&active.entry);
        info!(
            channel = %active.entry.id,
            topic = %active.entry.topic,
            "channel unsubscribed"
        );

        if !in_callback {
            let worker = active
                .worker
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(worker) = worker {
                let _ = worker.join();
            }
        }
    }

    /// True while the subscription is wanted and its channel not closed.
    pub fn is_active(&self) -> bool {
        self.inner
            .as_ref()
            .map(|a| a.control.is_wanted() && a.entry.state() != ChannelState::Closed)
            .unwrap_or(false)
    }

    /// True for the handle of a disabled descriptor.
    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    pub fn state(&self) -> ChannelState {
        self.inner
            .as_ref()
            .map(|a| a.entry.state())
            .unwrap_or(ChannelState::Closed)
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.inner.as_ref().map(|a| a.entry.id)
    }

    pub fn topic(&self) -> Option<&ChannelTopic> {
        self.inner.as_ref().map(|a| &a.entry.topic)
    }

    pub fn stats(&self) -> SubscriptionStats {
        self.inner
            .as_ref()
            .map(|a| a.entry.stats())
            .unwrap_or_default()
    }

    /// Block until the channel reaches `state` or `timeout` elapses.
    pub fn wait_for_state(&self, state: ChannelState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state() == state {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Some(active) => f
                .debug_struct("SubscriptionHandle")
                .field("channel", &active.entry.id)
                .field("topic", &active.entry.topic.name())
                .field("state", &active.entry.state())
                .finish(),
            None => f.write_str("SubscriptionHandle(noop)"),
        }
    }
}
