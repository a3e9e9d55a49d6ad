//! Local persistence for offline catalog access.
//!
//! This module provides the `LocalStore`, which keeps the last-known
//! catalog snapshot, the last-sync timestamp and a cache of tile icons
//! on disk. Every read failure is treated as "nothing cached" so the UI
//! can always render something.

pub mod local;

pub use local::LocalStore;
