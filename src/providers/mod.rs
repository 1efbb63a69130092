//! Trait boundaries for every external collaborator of the core.
//!
//! The remote change-stream store, the map/geofencing subsystem, the durable
//! key/value profile store, and the background job scheduler are all
//! consumed as `Arc<dyn ...>` so the core can be embedded against the real
//! services or the in-memory implementations in [`memory`].

pub mod map;
pub mod memory;
pub mod scheduler;
pub mod storage;
pub mod stream;

pub use map::MapLink;
pub use scheduler::JobScheduler;
pub use storage::{ProfileStore, SqliteProfileStore, StoreError};
pub use stream::{DispatchFeed, FeedError, StopBatch};
