use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::api::IconSource;
use crate::models::CatalogSnapshot;

/// File holding the serialized catalog snapshot.
const CATALOG_FILE: &str = "catalog.json";

/// File holding the RFC 3339 timestamp of the last successful sync.
const LAST_SYNC_FILE: &str = "last_sync";

/// Directory for cached icon images.
const ICON_DIR: &str = "icons";

/// Icon downloads run in parallel, but politely.
const MAX_CONCURRENT_ICON_DOWNLOADS: usize = 4;

/// Durable storage for the catalog snapshot and icon cache.
///
/// Public operations never return errors: failures are logged and reported
/// as `false`, an empty snapshot, `None` or `0`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(root.join(ICON_DIR))
            .with_context(|| format!("Failed to create store directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }

    fn last_sync_path(&self) -> PathBuf {
        self.root.join(LAST_SYNC_FILE)
    }

    fn icon_dir(&self) -> PathBuf {
        self.root.join(ICON_DIR)
    }

    /// Deterministic icon location, keyed by a hash of the entry id so any
    /// id is safe as a file name.
    fn icon_path(&self, id: &str) -> PathBuf {
        let digest = Sha256::digest(id.as_bytes());
        let name = hex::encode(&digest[..16]);
        self.icon_dir().join(format!("icon_{}.png", name))
    }

    /// Write `contents` to a sibling temp file and return its path.
    fn stage(path: &Path, contents: &[u8]) -> Result<PathBuf> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        Ok(tmp)
    }

    fn commit(tmp: &Path, path: &Path) -> Result<()> {
        std::fs::rename(tmp, path)
            .with_context(|| format!("Failed to move {} into place", path.display()))
    }

    /// Write to a sibling temp file then rename, so readers never see a torn file.
    fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        let tmp = Self::stage(path, contents)?;
        Self::commit(&tmp, path)
    }

    // ===== Snapshot =====

    /// Both files are staged before either is moved into place. The catalog
    /// rename is the commit point; a failure after it only leaves the
    /// last-sync key behind, and `last_sync` then reads the snapshot itself.
    fn try_save(&self, snapshot: &CatalogSnapshot) -> Result<()> {
        let contents = serde_json::to_vec_pretty(snapshot)?;
        let synced_at = snapshot.captured_at.unwrap_or_else(Utc::now);

        let catalog_path = self.catalog_path();
        let last_sync_path = self.last_sync_path();
        let catalog_tmp = Self::stage(&catalog_path, &contents)?;
        let last_sync_tmp = match Self::stage(&last_sync_path, synced_at.to_rfc3339().as_bytes()) {
            Ok(tmp) => tmp,
            Err(e) => {
                let _ = std::fs::remove_file(&catalog_tmp);
                return Err(e);
            }
        };

        if let Err(e) = Self::commit(&catalog_tmp, &catalog_path) {
            let _ = std::fs::remove_file(&catalog_tmp);
            let _ = std::fs::remove_file(&last_sync_tmp);
            return Err(e);
        }

        if let Err(e) = Self::commit(&last_sync_tmp, &last_sync_path) {
            warn!(error = %e, "Catalog stored but last sync key not updated");
            let _ = std::fs::remove_file(&last_sync_tmp);
        }
        Ok(())
    }

    /// Persist `snapshot`, replacing whatever was stored.
    ///
    /// Empty snapshots are refused so a bad fetch can never wipe good data.
    pub fn save(&self, snapshot: &CatalogSnapshot) -> bool {
        if snapshot.is_empty() {
            debug!("No entries to store - skipping catalog save");
            return false;
        }

        match self.try_save(snapshot) {
            Ok(()) => {
                info!(entries = snapshot.len(), "Catalog stored for offline use");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to store catalog");
                false
            }
        }
    }

    fn try_load(&self) -> Result<Option<CatalogSnapshot>> {
        let path = self.catalog_path();
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path).context("Failed to read catalog file")?;
        let snapshot = serde_json::from_str(&contents).context("Failed to parse catalog file")?;
        Ok(Some(snapshot))
    }

    /// Most recently saved snapshot, or an empty one if absent or corrupt.
    pub fn load(&self) -> CatalogSnapshot {
        match self.try_load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => CatalogSnapshot::empty(),
            Err(e) => {
                warn!(error = %e, "Cached catalog unreadable, treating as absent");
                CatalogSnapshot::empty()
            }
        }
    }

    /// Time of the last stored sync. Falls back to the stored snapshot's
    /// capture time when the key is missing or unreadable.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        match std::fs::read_to_string(self.last_sync_path()) {
            Ok(contents) => match DateTime::parse_from_rfc3339(contents.trim()) {
                Ok(dt) => return Some(dt.with_timezone(&Utc)),
                Err(e) => debug!(error = %e, "Failed to parse last sync timestamp"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(error = %e, "Failed to read last sync timestamp"),
        }
        self.load().captured_at
    }

    fn try_clear(&self) -> Result<()> {
        for path in [self.catalog_path(), self.last_sync_path()] {
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }

        let icons = self.icon_dir();
        if icons.exists() {
            std::fs::remove_dir_all(&icons).context("Failed to remove icon cache")?;
        }
        std::fs::create_dir_all(&icons).context("Failed to recreate icon cache")?;
        Ok(())
    }

    /// Remove the snapshot, last-sync key and every cached icon.
    pub fn clear(&self) -> bool {
        match self.try_clear() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to clear local store");
                false
            }
        }
    }

    // ===== Icons =====

    pub fn local_icon_path(&self, id: &str) -> Option<PathBuf> {
        let path = self.icon_path(id);
        path.exists().then_some(path)
    }

    /// Download the icon for `id` unless it is already cached.
    ///
    /// Returns whether a cached icon exists afterwards. Only `http(s)` URLs
    /// are fetched.
    pub async fn cache_icon(&self, source: &dyn IconSource, id: &str, url: &str) -> bool {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return false;
        }

        let path = self.icon_path(id);
        if path.exists() {
            return true;
        }

        let bytes = match source.fetch_icon(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(id = id, url = url, error = %e, "Failed to download icon");
                return false;
            }
        };

        match Self::write_atomic(&path, &bytes) {
            Ok(()) => {
                debug!(id = id, bytes = bytes.len(), "Icon cached");
                true
            }
            Err(e) => {
                warn!(id = id, error = %e, "Failed to write icon");
                false
            }
        }
    }

    /// Cache icons for every entry in `snapshot`. Returns how many are cached.
    pub async fn cache_icons(&self, source: &dyn IconSource, snapshot: &CatalogSnapshot) -> usize {
        let pending: Vec<(String, String)> = snapshot
            .entries
            .iter()
            .filter_map(|entry| Some((entry.id.clone(), entry.icon_url.clone()?)))
            .collect();

        let results: Vec<bool> = stream::iter(pending)
            .map(|(id, url)| async move { self.cache_icon(source, &id, &url).await })
            .buffer_unordered(MAX_CONCURRENT_ICON_DOWNLOADS)
            .collect()
            .await;
        results.into_iter().filter(|cached| *cached).count()
    }

    fn try_size_on_disk(&self) -> Result<u64> {
        let mut total = 0;
        for entry in std::fs::read_dir(self.icon_dir())? {
            let entry = entry?;
            if entry.path().extension().is_some_and(|ext| ext == "tmp") {
                continue;
            }
            let meta = entry.metadata()?;
            if meta.is_file() {
                total += meta.len();
            }
        }
        Ok(total)
    }

    /// Sum of cached icon file sizes; 0 when the icon cache cannot be enumerated.
    pub fn size_on_disk(&self) -> u64 {
        self.try_size_on_disk().unwrap_or_else(|e| {
            debug!(error = %e, "Failed to measure icon cache");
            0
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
