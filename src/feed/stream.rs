use std::sync::Arc;

use serde_json::Value;

use super::{ChannelTopic, TransportError};

/// One message received on a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    /// Position of the message in the backend's feed
    pub seq: u64,
    /// Raw realtime payload, decoded by the subscription layer
    pub payload: Value,
}

impl FeedMessage {
    pub fn new(seq: u64, payload: Value) -> Self {
        Self { seq, payload }
    }
}

/// An open channel on the backend's change feed.
///
/// This is a pull-based interface: the dispatcher polls it and delivers
/// messages in the order they are returned.
pub trait FeedStream: Send {
    /// Wait up to `timeout_ms` for the next message.
    ///
    /// `Err(TransportError::Closed)` means the backend ended the channel;
    /// any retryable error means the connection was lost.
    fn poll(&mut self, timeout_ms: u64) -> Result<Option<FeedMessage>, TransportError>;

    /// Close the channel. Must be idempotent.
    fn close(&mut self);
}

/// The backend connection context that channels are opened on.
///
/// Messages published after `open` returns are delivered on the new stream;
/// nothing earlier is replayed.
pub trait ChangeFeed: Send + Sync {
    fn open(&self, topic: &ChannelTopic) -> Result<Box<dyn FeedStream>, TransportError>;
}

impl<F: ChangeFeed + ?Sized> ChangeFeed for Arc<F> {
    fn open(&self, topic: &ChannelTopic) -> Result<Box<dyn FeedStream>, TransportError> {
        (**self).open(topic)
    }
}
