//! The built-in school catalog.
//!
//! Built-in entries are always present and cannot be edited or removed.
//! Entries created at runtime live in an in-memory overlay and are lost on
//! restart.

use super::{
    prepare_new, CatalogRepository, EntryPatch, MemoryRepository, NewEntry, RepositoryError,
    Result,
};
use crate::models::CatalogEntry;

struct Builtin {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    url: &'static str,
    category: &'static str,
    background_color: &'static str,
    requires_auth: bool,
    icon_url: &'static str,
}

const BUILTIN: &[Builtin] = &[
    Builtin {
        id: "dgms-main-website",
        name: "DGMS Main Website",
        description: "Official Deigratis Montessori School website",
        url: "https://deigratiams.edu.gh/",
        category: "Main",
        background_color: "#1976D2",
        requires_auth: false,
        icon_url: "https://res.cloudinary.com/ds5udo8jc/image/upload/v1/school_logo/dgm_logo_chkygj",
    },
    Builtin {
        id: "dgms-library",
        name: "DGMS Library",
        description: "Access the school digital library resources",
        url: "https://library.deigratiams.edu.gh",
        category: "Academic",
        background_color: "#4CAF50",
        requires_auth: false,
        icon_url: "https://cdn-icons-png.flaticon.com/512/2232/2232688.png",
    },
    Builtin {
        id: "student-dashboard",
        name: "Student Dashboard",
        description: "Student login portal for academic resources",
        url: "https://deigratiams.edu.gh/users/student-login/",
        category: "Student Portal",
        background_color: "#FF9800",
        requires_auth: true,
        icon_url: "https://cdn-icons-png.flaticon.com/512/3135/3135715.png",
    },
    Builtin {
        id: "parent-portal",
        name: "Parent Portal",
        description: "Parent login to monitor student progress",
        url: "https://deigratiams.edu.gh/users/parent-login/",
        category: "Parent Portal",
        background_color: "#9C27B0",
        requires_auth: true,
        icon_url: "https://cdn-icons-png.flaticon.com/512/1077/1077114.png",
    },
    Builtin {
        id: "teacher-portal",
        name: "Teacher Portal",
        description: "Teacher dashboard for class management",
        url: "https://deigratiams.edu.gh/users/teacher-login/",
        category: "Staff Portal",
        background_color: "#2196F3",
        requires_auth: true,
        icon_url: "https://cdn-icons-png.flaticon.com/512/1995/1995574.png",
    },
    Builtin {
        id: "staff-portal",
        name: "Non-Teaching Staff Portal",
        description: "Staff login for administrative tasks",
        url: "https://deigratiams.edu.gh/users/login/",
        category: "Staff Portal",
        background_color: "#607D8B",
        requires_auth: true,
        icon_url: "https://cdn-icons-png.flaticon.com/512/1077/1077063.png",
    },
    Builtin {
        id: "uschool-online",
        name: "USchool Online",
        description: "USchool online learning management system",
        url: "https://app.uschoolonline.com/Public/Login?ReturnUrl=%2fDefault",
        category: "Learning Management",
        background_color: "#E91E63",
        requires_auth: true,
        icon_url: "https://www.uschoolonline.com/assets/images/logo.png",
    },
];

/// The school's standard applications, in display order.
pub fn builtin_entries() -> Vec<CatalogEntry> {
    BUILTIN
        .iter()
        .zip(1..)
        .map(|(b, order)| CatalogEntry {
            id: b.id.to_string(),
            name: b.name.to_string(),
            description: Some(b.description.to_string()),
            url: b.url.to_string(),
            category: Some(b.category.to_string()),
            display_order: order,
            is_active: true,
            background_color: Some(b.background_color.to_string()),
            text_color: Some("#FFFFFF".to_string()),
            requires_auth: b.requires_auth,
            open_in_new_tab: false,
            icon_url: Some(b.icon_url.to_string()),
        })
        .collect()
}

/// Built-in catalog plus a volatile overlay of added entries.
pub struct StaticRepository {
    builtin: Vec<CatalogEntry>,
    overlay: MemoryRepository,
}

impl Default for StaticRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticRepository {
    pub fn new() -> Self {
        Self {
            builtin: builtin_entries(),
            overlay: MemoryRepository::new(),
        }
    }

    fn is_builtin(&self, id: &str) -> bool {
        self.builtin.iter().any(|e| e.id == id)
    }

    fn guard_writable(&self, id: &str) -> Result<()> {
        if self.is_builtin(id) {
            Err(RepositoryError::ReadOnly(id.to_string()))
        } else {
            Ok(())
        }
    }
}

impl CatalogRepository for StaticRepository {
    fn label(&self) -> &str {
        "static"
    }

    fn list_all(&self) -> Result<Vec<CatalogEntry>> {
        let mut all = self.builtin.clone();
        all.extend(self.overlay.list_all()?);
        all.sort_by(CatalogEntry::render_cmp);
        Ok(all)
    }

    fn get(&self, id: &str) -> Result<CatalogEntry> {
        match self.builtin.iter().find(|e| e.id == id) {
            Some(entry) => Ok(entry.clone()),
            None => self.overlay.get(id),
        }
    }

    fn create(&self, mut entry: NewEntry) -> Result<CatalogEntry> {
        // Ids and display order are assigned across both layers
        let prepared = prepare_new(entry.clone(), &self.list_all()?)?;
        entry.id = Some(prepared.id);
        entry.display_order = Some(prepared.display_order);
        self.overlay.create(entry)
    }

    fn update(&self, id: &str, patch: EntryPatch) -> Result<CatalogEntry> {
        self.guard_writable(id)?;
        self.overlay.update(id, patch)
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.guard_writable(id)?;
        self.overlay.delete(id)
    }

    fn reorder(&self, ids: &[String]) -> Result<()> {
        if let Some(id) = ids.iter().find(|id| self.is_builtin(id)) {
            return Err(RepositoryError::ReadOnly(id.clone()));
        }
        self.overlay.reorder(ids)
    }
}
