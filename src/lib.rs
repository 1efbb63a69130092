//! Trip synchronization core for the driver-facing dispatch app.
//!
//! This crate keeps a truck's current trip (an ordered list of stops, each
//! with its required driver actions) synchronized with a remote,
//! eventually-consistent change stream, drives exactly-once side effects
//! (geofence push, route recalculation, persisted form counts), coalesces
//! bursts of trip edits into single notifications, and runs the timed
//! "did you arrive" confirmation protocol.
//!
//! Everything outside the reconciliation core (the remote store, the map
//! subsystem, durable key/value storage, the background job scheduler) is a
//! trait in [`providers`], so the core can be embedded and tested without
//! any of them.

pub mod arrival;
pub mod config;
pub mod models;
pub mod providers;
pub mod session;
pub mod sync;

pub use config::CoreConfig;
pub use session::{SharedSession, TripSession};
pub use sync::TripSyncManager;
