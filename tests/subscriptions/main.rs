//! Subscription manager integration tests.
//!
//! Runs the manager against `InMemoryBackend`:
//! - Subscribe / unsubscribe lifecycle and the no-callback-after-unsubscribe
//!   guarantee
//! - Delivery: row filters, handler shapes, ordering, malformed payloads
//! - Reconnect with backoff and giving up

mod delivery;
mod lifecycle;
