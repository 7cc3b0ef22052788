//! Change feed - the backend's realtime transport, seen from this crate.
//!
//! The backend exposes one primitive: open a stream of change payloads for
//! a table, optionally narrowed by a row filter. This module describes that
//! primitive as two traits so the subscription manager can run against the
//! real backend or the in-memory one used in tests.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 SubscriptionManager                        │
//! │  - one dispatcher thread per enabled descriptor            │
//! └──────────────────────────────────────────────────────────┘
//!                            │ open(topic)
//!                            ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                 ChangeFeed (connection context)            │
//! │  open(topic) -> FeedStream                                 │
//! │  FeedStream: poll(timeout) / close()                       │
//! └──────────────────────────────────────────────────────────┘
//!          │                                   │
//!          ▼                                   ▼
//! ┌──────────────────┐              ┌──────────────────────┐
//! │ InMemoryBackend  │              │ realtime websocket   │
//! │   (included)     │              │     (external)       │
//! └──────────────────┘              └──────────────────────┘
//! ```

mod error;
mod stream;
mod topic;

pub use error::TransportError;
pub use stream::{ChangeFeed, FeedMessage, FeedStream};
pub use topic::ChannelTopic;
