//! Catalog repositories.
//!
//! `CatalogRepository` is the storage contract behind the catalog: the
//! built-in school list, an in-memory table, or a SQLite file. All three
//! share the validation and ordering rules in this module. A repository can
//! feed the sync engine directly through `RepositorySource`, which answers
//! with the same JSON envelope the REST backend returns.

pub mod builtin;
pub mod memory;
pub mod sqlite;

pub use builtin::{builtin_entries, StaticRepository};
pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::api::{ApiError, CatalogSource};
use crate::config::BackendConfig;
use crate::models::{applications_envelope, CatalogEntry};

const MAX_NAME_CHARS: usize = 100;
const MAX_URL_CHARS: usize = 500;
const MAX_CATEGORY_CHARS: usize = 50;

/// Category given to entries created without one.
const DEFAULT_CATEGORY: &str = "General";
const DEFAULT_BACKGROUND_COLOR: &str = "#1976D2";
const DEFAULT_TEXT_COLOR: &str = "#FFFFFF";

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Application not found: {0}")]
    NotFound(String),

    #[error("Invalid application: {0}")]
    Invalid(String),

    #[error("Application {0} already exists")]
    Duplicate(String),

    #[error("Built-in application {0} cannot be modified")]
    ReadOnly(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database directory unavailable: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Fields for a new catalog entry. `id` and `display_order` are assigned
/// when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewEntry {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub category: Option<String>,
    pub display_order: Option<i64>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub requires_auth: bool,
    pub open_in_new_tab: bool,
    pub icon_url: Option<String>,
}

impl NewEntry {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Build the stored entry with its final id and display order.
    pub(crate) fn into_entry(self, id: String, display_order: i64) -> CatalogEntry {
        CatalogEntry {
            id,
            name: self.name.trim().to_string(),
            description: self.description,
            url: self.url.trim().to_string(),
            category: Some(self.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string())),
            display_order,
            is_active: true,
            background_color: Some(
                self.background_color
                    .unwrap_or_else(|| DEFAULT_BACKGROUND_COLOR.to_string()),
            ),
            text_color: Some(self.text_color.unwrap_or_else(|| DEFAULT_TEXT_COLOR.to_string())),
            requires_auth: self.requires_auth,
            open_in_new_tab: self.open_in_new_tab,
            icon_url: self.icon_url,
        }
    }
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub category: Option<String>,
    pub display_order: Option<i64>,
    pub is_active: Option<bool>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub requires_auth: Option<bool>,
    pub open_in_new_tab: Option<bool>,
    pub icon_url: Option<String>,
}

impl EntryPatch {
    pub fn apply(self, entry: &mut CatalogEntry) {
        if let Some(name) = self.name {
            entry.name = name.trim().to_string();
        }
        if let Some(url) = self.url {
            entry.url = url.trim().to_string();
        }
        if self.description.is_some() {
            entry.description = self.description;
        }
        if self.category.is_some() {
            entry.category = self.category;
        }
        if let Some(order) = self.display_order {
            entry.display_order = order;
        }
        if let Some(active) = self.is_active {
            entry.is_active = active;
        }
        if self.background_color.is_some() {
            entry.background_color = self.background_color;
        }
        if self.text_color.is_some() {
            entry.text_color = self.text_color;
        }
        if let Some(auth) = self.requires_auth {
            entry.requires_auth = auth;
        }
        if let Some(new_tab) = self.open_in_new_tab {
            entry.open_in_new_tab = new_tab;
        }
        if self.icon_url.is_some() {
            entry.icon_url = self.icon_url;
        }
    }
}

/// Storage contract for the catalog table.
pub trait CatalogRepository: Send + Sync {
    /// Backend name for logs and diagnostics.
    fn label(&self) -> &str;

    /// Every entry, active or not, in render order.
    fn list_all(&self) -> Result<Vec<CatalogEntry>>;

    fn get(&self, id: &str) -> Result<CatalogEntry>;

    fn create(&self, entry: NewEntry) -> Result<CatalogEntry>;

    fn update(&self, id: &str, patch: EntryPatch) -> Result<CatalogEntry>;

    fn delete(&self, id: &str) -> Result<()>;

    /// Set each listed entry's display order to its 1-based position.
    /// Unknown ids fail the whole call and change nothing.
    fn reorder(&self, ids: &[String]) -> Result<()>;

    /// Active entries in render order, optionally limited to one category.
    fn list_active(&self, category: Option<&str>) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|e| e.is_active)
            .filter(|e| category.map_or(true, |c| e.category.as_deref() == Some(c)))
            .collect())
    }

    /// Distinct non-empty categories of active entries, sorted.
    fn categories(&self) -> Result<Vec<String>> {
        let mut categories: Vec<String> = self
            .list_active(None)?
            .into_iter()
            .filter_map(|e| e.category)
            .filter(|c| !c.is_empty())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }
}

// ============================================================================
// Shared rules
// ============================================================================

/// Check the fields every backend enforces on create and update.
pub fn validate_entry(entry: &CatalogEntry) -> Result<()> {
    let name_len = entry.name.trim().chars().count();
    if name_len == 0 || name_len > MAX_NAME_CHARS {
        return Err(RepositoryError::Invalid(format!(
            "name must be 1-{} characters",
            MAX_NAME_CHARS
        )));
    }

    if entry.url.chars().count() > MAX_URL_CHARS {
        return Err(RepositoryError::Invalid(format!(
            "url must be at most {} characters",
            MAX_URL_CHARS
        )));
    }
    let valid_url = Url::parse(&entry.url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false);
    if !valid_url {
        return Err(RepositoryError::Invalid(format!("invalid url: {}", entry.url)));
    }

    if let Some(ref category) = entry.category {
        if category.chars().count() > MAX_CATEGORY_CHARS {
            return Err(RepositoryError::Invalid(format!(
                "category must be at most {} characters",
                MAX_CATEGORY_CHARS
            )));
        }
    }

    for color in [&entry.background_color, &entry.text_color].into_iter().flatten() {
        if !is_hex_color(color) {
            return Err(RepositoryError::Invalid(format!(
                "color must be #RRGGBB, got {}",
                color
            )));
        }
    }

    if entry.display_order < 0 {
        return Err(RepositoryError::Invalid(
            "display order must not be negative".to_string(),
        ));
    }

    Ok(())
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Lowercase, dash-separated id derived from a name.
fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "app".to_string()
    } else {
        slug
    }
}

/// Pick an id for a new entry: the requested one, else a slug of the name
/// made unique with a numeric suffix.
pub(crate) fn assign_id(
    requested: Option<&str>,
    name: &str,
    taken: impl Fn(&str) -> bool,
) -> Result<String> {
    if let Some(id) = requested.map(str::trim).filter(|id| !id.is_empty()) {
        if taken(id) {
            return Err(RepositoryError::Duplicate(id.to_string()));
        }
        return Ok(id.to_string());
    }

    let base = slugify(name);
    if !taken(&base) {
        return Ok(base);
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate) {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Display order for an appended entry.
pub(crate) fn next_display_order<'a>(entries: impl IntoIterator<Item = &'a CatalogEntry>) -> i64 {
    entries
        .into_iter()
        .map(|e| e.display_order)
        .max()
        .map_or(1, |max| max.max(0) + 1)
}

/// Turn a `NewEntry` into a validated entry, given the entries already stored.
pub(crate) fn prepare_new(new: NewEntry, existing: &[CatalogEntry]) -> Result<CatalogEntry> {
    let id = assign_id(new.id.as_deref(), &new.name, |id| {
        existing.iter().any(|e| e.id == id)
    })?;
    let order = new
        .display_order
        .unwrap_or_else(|| next_display_order(existing));
    let entry = new.into_entry(id, order);
    validate_entry(&entry)?;
    Ok(entry)
}

// ============================================================================
// Factory and sync adapter
// ============================================================================

/// Open the repository a backend setting names. `Remote` has none.
pub fn open(backend: &BackendConfig) -> Result<Option<Arc<dyn CatalogRepository>>> {
    let repository: Arc<dyn CatalogRepository> = match backend {
        BackendConfig::Remote => return Ok(None),
        BackendConfig::Static => Arc::new(StaticRepository::new()),
        BackendConfig::Memory => Arc::new(MemoryRepository::seeded(builtin_entries())),
        BackendConfig::Sqlite { path } => {
            let repository = SqliteRepository::open(path)?;
            repository.seed_if_empty(&builtin_entries())?;
            Arc::new(repository)
        }
    };
    tracing::info!(backend = repository.label(), "Opened catalog repository");
    Ok(Some(repository))
}

/// Serves a repository's active entries as an applications envelope.
pub struct RepositorySource {
    repository: Arc<dyn CatalogRepository>,
    label: String,
}

impl RepositorySource {
    pub fn new(repository: Arc<dyn CatalogRepository>) -> Self {
        let label = format!("repository:{}", repository.label());
        Self { repository, label }
    }
}

#[async_trait]
impl CatalogSource for RepositorySource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_catalog(&self) -> std::result::Result<Value, ApiError> {
        let repository = Arc::clone(&self.repository);
        let entries = tokio::task::spawn_blocking(move || repository.list_active(None))
            .await
            .map_err(|e| ApiError::ServerError(format!("repository task failed: {}", e)))?
            .map_err(|e| ApiError::ServerError(e.to_string()))?;
        Ok(applications_envelope(&entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry::tests::entry;
    use crate::models::parse_applications;

    #[test]
    fn test_validate_entry_rules() {
        assert!(validate_entry(&entry("a", "Library", 1)).is_ok());

        let mut e = entry("a", "", 1);
        assert!(matches!(validate_entry(&e), Err(RepositoryError::Invalid(_))));

        e = entry("a", &"x".repeat(101), 1);
        assert!(validate_entry(&e).is_err());

        e = entry("a", "Library", 1);
        e.url = "ftp://files.example.edu".to_string();
        assert!(validate_entry(&e).is_err());
        e.url = format!("https://example.edu/{}", "p".repeat(500));
        assert!(validate_entry(&e).is_err());

        e = entry("a", "Library", 1);
        e.category = Some("c".repeat(51));
        assert!(validate_entry(&e).is_err());

        e = entry("a", "Library", 1);
        e.background_color = Some("#12345G".to_string());
        assert!(validate_entry(&e).is_err());
        e.background_color = Some("#4caf50".to_string());
        assert!(validate_entry(&e).is_ok());

        e.display_order = -1;
        assert!(validate_entry(&e).is_err());
    }

    #[test]
    fn test_assign_id() {
        let taken = |id: &str| id == "parent-portal" || id == "parent-portal-2";
        assert_eq!(assign_id(None, "Parent Portal", taken).unwrap(), "parent-portal-3");
        assert_eq!(assign_id(None, "  Library!! ", taken).unwrap(), "library");
        assert_eq!(assign_id(None, "***", taken).unwrap(), "app");
        assert_eq!(assign_id(Some("lib"), "Library", taken).unwrap(), "lib");
        assert!(matches!(
            assign_id(Some("parent-portal"), "x", taken),
            Err(RepositoryError::Duplicate(_))
        ));
    }

    #[test]
    fn test_new_entry_defaults() {
        let created = prepare_new(
            NewEntry::new("School Blog", "https://blog.deigratiams.edu.gh"),
            &[entry("a", "A", 4)],
        )
        .unwrap();
        assert_eq!(created.id, "school-blog");
        assert_eq!(created.display_order, 5);
        assert_eq!(created.category.as_deref(), Some("General"));
        assert_eq!(created.background_color.as_deref(), Some("#1976D2"));
        assert!(created.is_active);
    }

    #[test]
    fn test_open_backends() {
        assert!(open(&BackendConfig::Remote).unwrap().is_none());

        let repo = open(&BackendConfig::Memory).unwrap().unwrap();
        assert_eq!(repo.list_active(None).unwrap().len(), builtin_entries().len());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let repo = open(&BackendConfig::Sqlite { path: path.clone() }).unwrap().unwrap();
        assert_eq!(repo.list_active(None).unwrap().len(), builtin_entries().len());
        drop(repo);

        // Reopening must not seed twice
        let repo = open(&BackendConfig::Sqlite { path }).unwrap().unwrap();
        assert_eq!(repo.list_all().unwrap().len(), builtin_entries().len());
    }

    #[tokio::test]
    async fn test_repository_source_produces_parseable_envelope() {
        let repo = Arc::new(MemoryRepository::seeded(builtin_entries()));
        repo.update(
            "uschool-online",
            EntryPatch {
                is_active: Some(false),
                ..EntryPatch::default()
            },
        )
        .unwrap();

        let source = RepositorySource::new(repo);
        assert_eq!(source.label(), "repository:memory");

        let payload = source.fetch_catalog().await.unwrap();
        let parsed = parse_applications(&payload).unwrap();
        assert_eq!(parsed.dropped, 0);
        assert_eq!(parsed.entries.len(), builtin_entries().len() - 1);
        assert_eq!(parsed.entries[0].id, "dgms-main-website");
    }
}
