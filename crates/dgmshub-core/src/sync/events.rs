use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SyncError;
use crate::models::CatalogSnapshot;

/// Where a catalog handed to the UI came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub enum CatalogOrigin {
    /// Freshly fetched and stored
    Network,
    /// Served from the local store
    Cache,
    /// Offline and nothing stored yet
    NoDataAvailable,
    /// Fetch failed and nothing stored
    ErrorNoData,
}

impl CatalogOrigin {
    pub fn label(&self) -> &'static str {
        match self {
            CatalogOrigin::Network => "from network",
            CatalogOrigin::Cache => "from cache",
            CatalogOrigin::NoDataAvailable => "no data available",
            CatalogOrigin::ErrorNoData => "error, no data",
        }
    }
}

/// A catalog plus how it was obtained, for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResult {
    pub snapshot: CatalogSnapshot,
    pub origin: CatalogOrigin,
    pub message: String,
}

impl CatalogResult {
    pub fn from_cache(&self) -> bool {
        self.origin == CatalogOrigin::Cache
    }

    pub fn has_data(&self) -> bool {
        !self.snapshot.is_empty()
    }
}

/// Notifications sent to sync listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SyncEvent {
    SyncStart,
    SyncSuccess {
        timestamp: DateTime<Utc>,
        entry_count: usize,
    },
    SyncError {
        error: String,
        timestamp: DateTime<Utc>,
    },
    NetworkChange {
        is_online: bool,
    },
    CacheCleared {
        timestamp: DateTime<Utc>,
    },
}

/// In-memory sync bookkeeping, owned by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Last successful sync in this process
    pub last_sync: Option<DateTime<Utc>>,
    pub is_syncing: bool,
    pub is_reachable: bool,
    pub last_error: Option<String>,
}

/// Why `sync_now` did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadySyncing,
    Offline,
    /// The stored catalog is recent enough
    Fresh,
}

/// Result of a background sync trigger.
#[derive(Debug)]
pub enum SyncOutcome {
    Synced {
        timestamp: DateTime<Utc>,
        entry_count: usize,
    },
    Skipped(SkipReason),
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced { .. })
    }
}

/// Cache and connectivity summary for diagnostics screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SyncDiagnostics {
    pub is_online: bool,
    pub is_syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub cache_size_bytes: u64,
    pub entry_count: usize,
    pub is_stale: bool,
    pub sync_interval_secs: u64,
}
