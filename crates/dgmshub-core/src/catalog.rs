//! Consumer-side view of the catalog.
//!
//! `CatalogView` turns a `CatalogResult` into what a launcher screen shows:
//! the active tiles in render order, narrowed by search text and category,
//! plus the label line describing where the data came from.

use std::path::PathBuf;

use crate::models::{CatalogEntry, CatalogSnapshot};
use crate::store::LocalStore;
use crate::sync::{CatalogOrigin, CatalogResult};
use crate::utils::contains_ignore_case;

/// Category filter value that matches everything.
pub const ALL_CATEGORIES: &str = "All";

/// What to open when a tile is activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserTarget {
    pub url: String,
    pub name: String,
}

impl From<&CatalogEntry> for BrowserTarget {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            url: entry.url.clone(),
            name: entry.name.clone(),
        }
    }
}

/// How a tile's icon should be drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconRef {
    /// Downloaded into the local store
    Local(PathBuf),
    /// Not cached yet; load from the network
    Remote(String),
    /// No icon at all; draw the entry's initial
    Placeholder(char),
}

/// Prefer the cached file, then the remote URL, then a glyph.
pub fn resolve_icon(store: &LocalStore, entry: &CatalogEntry) -> IconRef {
    if let Some(path) = store.local_icon_path(&entry.id) {
        return IconRef::Local(path);
    }
    match entry.icon_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => IconRef::Remote(url.to_string()),
        None => IconRef::Placeholder(entry.placeholder_glyph()),
    }
}

/// Filtered view over the current catalog.
#[derive(Debug, Clone)]
pub struct CatalogView {
    snapshot: CatalogSnapshot,
    origin: Option<CatalogOrigin>,
    message: String,
    search: String,
    category: String,
}

impl Default for CatalogView {
    fn default() -> Self {
        Self {
            snapshot: CatalogSnapshot::empty(),
            origin: None,
            message: String::new(),
            search: String::new(),
            category: ALL_CATEGORIES.to_string(),
        }
    }
}

impl CatalogView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog, keeping search text. A category that no longer
    /// exists resets to "All".
    pub fn apply(&mut self, result: CatalogResult) {
        self.snapshot = result.snapshot;
        self.origin = Some(result.origin);
        self.message = result.message;
        if !self.categories().contains(&self.category) {
            self.category = ALL_CATEGORIES.to_string();
        }
    }

    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    pub fn origin(&self) -> Option<CatalogOrigin> {
        self.origin
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.search = query.into();
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn set_category(&mut self, category: impl Into<String>) {
        self.category = category.into();
    }

    /// "All" followed by the distinct non-empty categories of active entries, sorted.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .active()
            .filter_map(|e| e.category.clone())
            .filter(|c| !c.is_empty())
            .collect();
        categories.sort();
        categories.dedup();
        categories.insert(0, ALL_CATEGORIES.to_string());
        categories
    }

    /// Step the category filter forward (or back) through `categories()`.
    pub fn cycle_category(&mut self, forward: bool) {
        let categories = self.categories();
        let current = categories
            .iter()
            .position(|c| *c == self.category)
            .unwrap_or(0);
        let len = categories.len();
        let next = if forward {
            (current + 1) % len
        } else {
            (current + len - 1) % len
        };
        self.category = categories[next].clone();
    }

    fn active(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.snapshot.entries.iter().filter(|e| e.is_active)
    }

    /// Tiles to show, in render order.
    pub fn visible(&self) -> Vec<&CatalogEntry> {
        let query = self.search.trim();
        self.active()
            .filter(|e| query.is_empty() || contains_ignore_case(&e.name, query))
            .filter(|e| self.category == ALL_CATEGORIES || e.category.as_deref() == Some(&self.category))
            .collect()
    }

    pub fn target(&self, index: usize) -> Option<BrowserTarget> {
        self.visible().get(index).map(|e| BrowserTarget::from(*e))
    }

    /// One-line description of where the catalog came from and how old it is.
    pub fn source_label(&self) -> String {
        match self.origin {
            None => "Loading...".to_string(),
            Some(origin) => format!("{} · updated {}", origin.label(), self.snapshot.age_display()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.visible().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry::tests::entry;

    fn view() -> CatalogView {
        let mut lib = entry("lib", "DGMS Library", 2);
        lib.category = Some("Academic".to_string());
        let mut parent = entry("parent", "Parent Portal", 3);
        parent.category = Some("Parent Portal".to_string());
        let mut web = entry("web", "DGMS Main Website", 1);
        web.category = Some("Main".to_string());
        let mut old = entry("old", "Old Library", 4);
        old.is_active = false;
        old.category = Some("Archive".to_string());

        let mut view = CatalogView::new();
        view.apply(CatalogResult {
            snapshot: CatalogSnapshot::new(vec![lib, parent, web, old]),
            origin: CatalogOrigin::Cache,
            message: "Loaded 4 apps from offline cache".to_string(),
        });
        view
    }

    fn ids(view: &CatalogView) -> Vec<&str> {
        view.visible().iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_visible_hides_inactive_and_keeps_order() {
        assert_eq!(ids(&view()), vec!["web", "lib", "parent"]);
    }

    #[test]
    fn test_search_is_case_insensitive_on_name() {
        let mut view = view();
        view.set_search("dgms");
        assert_eq!(ids(&view), vec!["web", "lib"]);

        view.set_search("LIBRARY");
        assert_eq!(ids(&view), vec!["lib"]);

        view.set_search("academic");
        assert!(view.is_empty());
    }

    #[test]
    fn test_category_filter_and_cycle() {
        let mut view = view();
        assert_eq!(view.categories(), vec!["All", "Academic", "Main", "Parent Portal"]);

        view.cycle_category(true);
        assert_eq!(view.category(), "Academic");
        assert_eq!(ids(&view), vec!["lib"]);

        view.cycle_category(false);
        view.cycle_category(false);
        assert_eq!(view.category(), "Parent Portal");

        view.set_search("dgms");
        assert!(view.is_empty());
    }

    #[test]
    fn test_unknown_category_resets_on_apply() {
        let mut view = view();
        view.set_category("Main");
        view.apply(CatalogResult {
            snapshot: CatalogSnapshot::new(vec![entry("x", "Other", 1)]),
            origin: CatalogOrigin::Network,
            message: String::new(),
        });
        assert_eq!(view.category(), ALL_CATEGORIES);
        assert_eq!(ids(&view), vec!["x"]);
    }

    #[test]
    fn test_target_carries_url_and_name() {
        let view = view();
        assert_eq!(
            view.target(1),
            Some(BrowserTarget {
                url: "https://lib.example.edu/".to_string(),
                name: "DGMS Library".to_string(),
            })
        );
        assert_eq!(view.target(10), None);
    }

    #[test]
    fn test_source_label() {
        assert_eq!(CatalogView::new().source_label(), "Loading...");
        assert!(view().source_label().starts_with("from cache"));
    }

    #[test]
    fn test_resolve_icon_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf()).unwrap();

        let mut e = entry("lib", "Library", 1);
        assert_eq!(resolve_icon(&store, &e), IconRef::Placeholder('L'));

        e.icon_url = Some("https://cdn.example.edu/lib.png".to_string());
        assert_eq!(
            resolve_icon(&store, &e),
            IconRef::Remote("https://cdn.example.edu/lib.png".to_string())
        );
    }
}
