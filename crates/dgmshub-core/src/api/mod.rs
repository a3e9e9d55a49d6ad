//! REST API client module for the DGMS Hub backend.
//!
//! This module provides the `ApiClient` for fetching the application
//! catalog, downloading tile icons and checking backend health, plus the
//! `CatalogSource`/`IconSource` seams the sync engine and offline store
//! depend on, so both can run against something other than HTTP.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;

use async_trait::async_trait;
use serde_json::Value;

/// Where the sync engine gets the raw catalog payload from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Human-readable label identifying this source in logs.
    fn label(&self) -> &str;

    /// Fetch the `GET /applications` response body.
    async fn fetch_catalog(&self) -> Result<Value, ApiError>;
}

/// Where the offline store downloads icon bytes from.
#[async_trait]
pub trait IconSource: Send + Sync {
    async fn fetch_icon(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}
