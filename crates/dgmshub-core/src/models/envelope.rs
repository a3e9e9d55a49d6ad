//! Validation of the `GET /applications` response envelope.
//!
//! The only accepted shape is
//! `{ "success": true, "data": { "applications": [ ... ] } }`.
//! Entries inside the array are validated one by one; an entry that fails
//! is dropped and counted, never fatal to the whole payload.

use std::collections::HashSet;

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::entry::{favicon_url, CatalogEntry};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("server reported failure: {0}")]
    Rejected(String),

    #[error("malformed envelope: {0}")]
    Malformed(String),
}

/// Entries that survived validation, plus how many were dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCatalog {
    pub entries: Vec<CatalogEntry>,
    pub dropped: usize,
}

/// Loose wire shape; every field optional so one bad value only drops its entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    display_order: Option<i64>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    background_color: Option<String>,
    #[serde(default)]
    text_color: Option<String>,
    #[serde(default)]
    requires_auth: Option<bool>,
    #[serde(default)]
    open_in_new_tab: Option<bool>,
    #[serde(default)]
    icon_url: Option<String>,
    #[serde(default)]
    icon: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn is_web_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

impl WireEntry {
    fn into_entry(self) -> Option<CatalogEntry> {
        let name = non_empty(self.name)?;
        let url = non_empty(self.url)?;
        if !is_web_url(&url) {
            return None;
        }

        let id = match self.id {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            // Entries without an id are keyed by their URL
            _ => url.clone(),
        };

        let icon_url = non_empty(self.icon_url)
            .or_else(|| non_empty(self.icon))
            .or_else(|| favicon_url(&url));

        Some(CatalogEntry {
            id,
            name,
            description: non_empty(self.description),
            url,
            category: non_empty(self.category),
            display_order: self.display_order.unwrap_or(0),
            is_active: self.is_active.unwrap_or(true),
            background_color: non_empty(self.background_color),
            text_color: non_empty(self.text_color),
            requires_auth: self.requires_auth.unwrap_or(false),
            open_in_new_tab: self.open_in_new_tab.unwrap_or(false),
            icon_url,
        })
    }
}

/// Validate a response body and extract its catalog entries.
///
/// Duplicate ids keep the first occurrence. The returned entries are in
/// payload order; callers sort them when building a snapshot.
pub fn parse_applications(payload: &Value) -> Result<ParsedCatalog, PayloadError> {
    let object = payload
        .as_object()
        .ok_or_else(|| PayloadError::Malformed("body is not a JSON object".to_string()))?;

    match object.get("success") {
        Some(Value::Bool(true)) => {}
        Some(Value::Bool(false)) => {
            let message = object
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no message")
                .to_string();
            return Err(PayloadError::Rejected(message));
        }
        _ => {
            return Err(PayloadError::Malformed(
                "missing boolean `success` field".to_string(),
            ))
        }
    }

    let applications = object
        .get("data")
        .and_then(|d| d.get("applications"))
        .and_then(Value::as_array)
        .ok_or_else(|| PayloadError::Malformed("missing `data.applications` array".to_string()))?;

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(applications.len());
    let mut dropped = 0;

    for raw in applications {
        let entry = serde_json::from_value::<WireEntry>(raw.clone())
            .ok()
            .and_then(WireEntry::into_entry);

        match entry {
            Some(entry) if seen.insert(entry.id.clone()) => entries.push(entry),
            Some(entry) => {
                debug!(id = %entry.id, "Dropping duplicate catalog entry");
                dropped += 1;
            }
            None => {
                debug!(entry = %raw, "Dropping invalid catalog entry");
                dropped += 1;
            }
        }
    }

    Ok(ParsedCatalog { entries, dropped })
}

/// Wrap entries in the response envelope served by `GET /applications`.
pub fn applications_envelope(entries: &[CatalogEntry]) -> Value {
    serde_json::json!({
        "success": true,
        "data": {
            "applications": entries,
        }
    })
}
