use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Favicon service used when an entry ships without an icon.
const FAVICON_SERVICE_URL: &str = "https://www.google.com/s2/favicons?domain=";

/// Snapshots older than this are considered stale unless configured otherwise.
pub const DEFAULT_STALE_MINUTES: i64 = 60;

/// A single school web application in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub open_in_new_tab: bool,
    #[serde(default)]
    pub icon_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl CatalogEntry {
    /// Render order: display order ascending, then name.
    pub fn render_cmp(&self, other: &Self) -> Ordering {
        self.display_order
            .cmp(&other.display_order)
            .then_with(|| self.name.cmp(&other.name))
    }

    /// Category label, or "Other" for uncategorized entries
    pub fn category_label(&self) -> &str {
        self.category
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or("Other")
    }

    /// Host part of the entry URL, if it parses
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }

    /// Placeholder glyph for tiles without an icon
    pub fn placeholder_glyph(&self) -> char {
        self.name
            .chars()
            .find(|c| c.is_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('?')
    }
}

/// Build the favicon-service URL for an application URL.
pub fn favicon_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}{}", FAVICON_SERVICE_URL, host))
}

/// An immutable, ordered copy of the catalog as last known.
///
/// Snapshots are replaced wholesale on every successful sync. An empty
/// snapshot (nothing cached yet) carries no capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub entries: Vec<CatalogEntry>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl CatalogSnapshot {
    /// Capture a new snapshot now, sorted into render order.
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self::captured(entries, Utc::now())
    }

    pub fn captured(mut entries: Vec<CatalogEntry>, captured_at: DateTime<Utc>) -> Self {
        entries.sort_by(CatalogEntry::render_cmp);
        Self {
            entries,
            captured_at: Some(captured_at),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn find(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn age_minutes(&self) -> Option<i64> {
        self.captured_at
            .map(|at| (Utc::now() - at).num_minutes())
    }

    pub fn age_display(&self) -> String {
        let minutes = match self.age_minutes() {
            Some(m) => m,
            None => return "never".to_string(),
        };
        if minutes < 1 {
            // Negative ages come from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    /// Whether the snapshot is older than `threshold_minutes`. Never-synced is stale.
    pub fn is_stale_after(&self, threshold_minutes: i64) -> bool {
        self.age_minutes()
            .map(|m| m > threshold_minutes)
            .unwrap_or(true)
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_after(DEFAULT_STALE_MINUTES)
    }
}

// ============================================================================
// Tests
// ============================================================================
