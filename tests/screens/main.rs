//! Screen-level integration tests.
//!
//! Each test plays a dashboard screen: subscribe, bulk-load, reconcile live
//! changes into a local collection, and unmount.

mod classes;
mod snapshot_race;
