//! Catalog synchronization.
//!
//! The `SyncEngine` is the only writer of the stored catalog snapshot. It
//! decides when to hit the remote API and when to serve the local store,
//! runs the periodic sync timer, reacts to connectivity being restored and
//! notifies listeners about every sync.
//!
//! At most one sync is in flight at a time. Concurrent triggers either join
//! the running attempt (`get_catalog`) or are dropped (`sync_now`).

pub mod engine;
pub mod error;
pub mod events;

pub use engine::{SyncEngine, SyncSettings};
pub use error::SyncError;
pub use events::{
    CatalogOrigin, CatalogResult, SkipReason, SyncDiagnostics, SyncEvent, SyncOutcome, SyncState,
};
