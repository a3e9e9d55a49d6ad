//! DGMS Hub core - offline catalog cache and sync layer.
//!
//! This crate keeps a local copy of the school's application catalog
//! usable with or without a network connection:
//!
//! - `api`: HTTP client for the catalog backend
//! - `store`: on-disk snapshot, last-sync timestamp and icon cache
//! - `connectivity`: reachability state with change notifications
//! - `sync`: the engine that decides between network and cache
//! - `repository`: catalog storage backends (built-in, memory, SQLite)
//! - `catalog`: search and category filtering for a launcher screen

pub mod api;
pub mod catalog;
pub mod config;
pub mod connectivity;
pub mod listeners;
pub mod models;
pub mod repository;
pub mod store;
pub mod sync;
pub mod utils;

pub use api::{ApiClient, ApiError, CatalogSource, IconSource};
pub use catalog::{BrowserTarget, CatalogView, IconRef};
pub use config::{BackendConfig, Config};
pub use connectivity::ConnectivityMonitor;
pub use listeners::Subscription;
pub use models::{CatalogEntry, CatalogSnapshot};
pub use repository::{CatalogRepository, RepositorySource};
pub use store::LocalStore;
pub use sync::{CatalogOrigin, CatalogResult, SyncEngine, SyncEvent, SyncSettings};
