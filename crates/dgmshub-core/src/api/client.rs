//! API client for communicating with the DGMS Hub REST API.
//!
//! This module provides the `ApiClient` struct for fetching the
//! application catalog, tile icons and the backend health report.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ApiError, CatalogSource, IconSource};

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Health checks should answer quickly or not at all.
const HEALTH_TIMEOUT_SECS: u64 = 5;

/// Icons larger than this are not worth keeping offline.
const MAX_ICON_BYTES: usize = 2 * 1024 * 1024;

/// Backend health report from `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// API client for the DGMS Hub backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client for `base_url` (e.g. `https://host/api`)
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn applications_url(&self) -> String {
        format!("{}/applications", self.base_url)
    }

    /// Health lives at the server root, outside the `/api` prefix.
    pub fn health_url(&self) -> String {
        let root = self.base_url.strip_suffix("/api").unwrap_or(&self.base_url);
        format!("{}/health", root)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    // ===== Data Fetching Methods =====

    /// Fetch the raw catalog envelope
    pub async fn fetch_applications(&self) -> Result<Value, ApiError> {
        let url = self.applications_url();
        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        debug!(bytes = text.len(), "Applications response received");

        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse applications: {}", e)))
    }

    /// Download an icon image
    pub async fn download_icon(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.client.get(url).send().await?;
        let response = Self::check_response(response).await?;
        let bytes = response.bytes().await?;

        if bytes.is_empty() {
            return Err(ApiError::InvalidResponse(format!("Empty icon body from {}", url)));
        }
        if bytes.len() > MAX_ICON_BYTES {
            return Err(ApiError::InvalidResponse(format!(
                "Icon from {} is {} bytes, over the {} byte limit",
                url,
                bytes.len(),
                MAX_ICON_BYTES
            )));
        }
        Ok(bytes.to_vec())
    }

    /// Query the backend health endpoint
    pub async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        let response = self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl CatalogSource for ApiClient {
    fn label(&self) -> &str {
        &self.base_url
    }

    async fn fetch_catalog(&self) -> Result<Value, ApiError> {
        self.fetch_applications().await
    }
}

#[async_trait]
impl IconSource for ApiClient {
    async fn fetch_icon(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.download_icon(url).await
    }
}

// ============================================================================
// Tests
// ============================================================================
