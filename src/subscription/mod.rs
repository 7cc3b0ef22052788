//! Subscriptions - declaring interest in a table and receiving its changes.
//!
//! - [`SubscriptionDescriptor`] - what a screen wants (table, filters,
//!   handlers, enabled flag)
//! - [`SubscriptionManager`] - opens one channel per enabled descriptor and
//!   dispatches its events
//! - [`SubscriptionHandle`] - returned by `subscribe`; `unsubscribe()` is its
//!   only verb
//! - [`ReconnectPolicy`] - bounded exponential backoff for lost connections
//!
//! Delivery is at-most-once: events committed while a channel is
//! reconnecting are not replayed. Screens recover by reloading.

mod channel;
mod descriptor;
mod error;
mod handle;
mod manager;
mod reconnect;

pub use channel::{ChannelId, ChannelInfo, ChannelState, SubscriptionStats};
pub use descriptor::{ErrorCallback, EventCallback, Handlers, OperationFilter, SubscriptionDescriptor};
pub use error::SubscriptionError;
pub use handle::SubscriptionHandle;
pub use manager::SubscriptionManager;
pub use reconnect::ReconnectPolicy;
