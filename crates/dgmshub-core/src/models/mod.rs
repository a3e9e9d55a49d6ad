//! Data models for the DGMS Hub catalog.
//!
//! This module contains the data structures shared by the API client,
//! the offline store and the sync engine:
//!
//! - `CatalogEntry`: one school web application shown as a tile
//! - `CatalogSnapshot`: an ordered, timestamped copy of the whole catalog
//! - `parse_applications`: validation of the remote JSON envelope

pub mod entry;
pub mod envelope;

pub use entry::{favicon_url, CatalogEntry, CatalogSnapshot};
pub use envelope::{applications_envelope, parse_applications, ParsedCatalog, PayloadError};
