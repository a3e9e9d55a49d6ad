use std::sync::{Mutex, MutexGuard};

use super::{
    prepare_new, validate_entry, CatalogRepository, EntryPatch, NewEntry, RepositoryError, Result,
};
use crate::models::CatalogEntry;

/// A catalog table held in memory.
#[derive(Default)]
pub struct MemoryRepository {
    entries: Mutex<Vec<CatalogEntry>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<CatalogEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CatalogRepository for MemoryRepository {
    fn label(&self) -> &str {
        "memory"
    }

    fn list_all(&self) -> Result<Vec<CatalogEntry>> {
        let mut all = self.entries().clone();
        all.sort_by(CatalogEntry::render_cmp);
        Ok(all)
    }

    fn get(&self, id: &str) -> Result<CatalogEntry> {
        self.entries()
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    fn create(&self, entry: NewEntry) -> Result<CatalogEntry> {
        let mut entries = self.entries();
        let created = prepare_new(entry, &entries)?;
        entries.push(created.clone());
        Ok(created)
    }

    fn update(&self, id: &str, patch: EntryPatch) -> Result<CatalogEntry> {
        let mut entries = self.entries();
        let slot = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        let mut updated = slot.clone();
        patch.apply(&mut updated);
        validate_entry(&updated)?;
        *slot = updated.clone();
        Ok(updated)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn reorder(&self, ids: &[String]) -> Result<()> {
        let mut entries = self.entries();
        if let Some(missing) = ids.iter().find(|id| !entries.iter().any(|e| &e.id == *id)) {
            return Err(RepositoryError::NotFound(missing.clone()));
        }
        for (position, id) in ids.iter().enumerate() {
            if let Some(entry) = entries.iter_mut().find(|e| &e.id == id) {
                entry.display_order = position as i64 + 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry::tests::entry;

    fn repo() -> MemoryRepository {
        MemoryRepository::seeded(vec![
            entry("lib", "Library", 1),
            entry("web", "Website", 2),
            entry("lms", "Learning", 3),
        ])
    }

    #[test]
    fn test_crud() {
        let repo = repo();
        let created = repo
            .create(NewEntry {
                category: Some("Staff Portal".to_string()),
                ..NewEntry::new("Teacher Portal", "https://deigratiams.edu.gh/users/teacher-login/")
            })
            .unwrap();
        assert_eq!(created.id, "teacher-portal");
        assert_eq!(created.display_order, 4);
        assert_eq!(repo.get("teacher-portal").unwrap(), created);

        let updated = repo
            .update(
                "lib",
                EntryPatch {
                    category: Some("Main".to_string()),
                    ..EntryPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.category.as_deref(), Some("Main"));
        assert_eq!(repo.categories().unwrap(), vec!["Academic", "Main", "Staff Portal"]);

        repo.delete("web").unwrap();
        assert!(matches!(repo.delete("web"), Err(RepositoryError::NotFound(_))));
        assert_eq!(repo.list_all().unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_update_leaves_entry_unchanged() {
        let repo = repo();
        let result = repo.update(
            "lib",
            EntryPatch {
                url: Some("not a url".to_string()),
                ..EntryPatch::default()
            },
        );
        assert!(matches!(result, Err(RepositoryError::Invalid(_))));
        assert_eq!(repo.get("lib").unwrap().url, "https://lib.example.edu/");
    }

    #[test]
    fn test_inactive_entries_hidden_from_active_list() {
        let repo = repo();
        repo.update(
            "web",
            EntryPatch {
                is_active: Some(false),
                ..EntryPatch::default()
            },
        )
        .unwrap();

        let ids: Vec<String> = repo.list_active(None).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["lib", "lms"]);
        assert_eq!(repo.list_all().unwrap().len(), 3);
    }

    #[test]
    fn test_reorder() {
        let repo = repo();
        repo.reorder(&["lms".to_string(), "lib".to_string(), "web".to_string()])
            .unwrap();
        let ids: Vec<String> = repo.list_active(None).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["lms", "lib", "web"]);

        let err = repo.reorder(&["web".to_string(), "ghost".to_string()]);
        assert!(matches!(err, Err(RepositoryError::NotFound(id)) if id == "ghost"));
        assert_eq!(repo.get("web").unwrap().display_order, 3);
    }
}
