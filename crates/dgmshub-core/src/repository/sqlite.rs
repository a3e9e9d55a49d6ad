//! SQLite-backed catalog table.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::{
    prepare_new, validate_entry, CatalogRepository, EntryPatch, NewEntry, RepositoryError, Result,
};
use crate::models::CatalogEntry;

const SCHEMA_VERSION: i32 = 1;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS applications (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    url TEXT NOT NULL,
    category TEXT,
    display_order INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    background_color TEXT,
    text_color TEXT,
    requires_auth INTEGER NOT NULL DEFAULT 0,
    open_in_new_tab INTEGER NOT NULL DEFAULT 0,
    icon_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_applications_order ON applications(display_order, name);
"#;

const SELECT_COLUMNS: &str = "id, name, description, url, category, display_order, is_active, \
     background_color, text_color, requires_auth, open_in_new_tab, icon_url";

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open or create a database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .ok();

        if version.is_none() {
            conn.execute_batch(CREATE_TABLES)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
            info!(version = SCHEMA_VERSION, "Catalog database schema created");
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert `entries` if the table is empty. Returns how many were inserted.
    pub fn seed_if_empty(&self, entries: &[CatalogEntry]) -> Result<usize> {
        let mut conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM applications", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(0);
        }

        let tx = conn.transaction()?;
        for entry in entries {
            insert(&tx, entry)?;
        }
        tx.commit()?;
        info!(count = entries.len(), "Seeded catalog database");
        Ok(entries.len())
    }

    fn load(conn: &Connection, id: &str) -> Result<CatalogEntry> {
        conn.query_row(
            &format!("SELECT {} FROM applications WHERE id = ?1", SELECT_COLUMNS),
            params![id],
            row_to_entry,
        )
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    Ok(CatalogEntry {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        url: row.get(3)?,
        category: row.get(4)?,
        display_order: row.get(5)?,
        is_active: row.get(6)?,
        background_color: row.get(7)?,
        text_color: row.get(8)?,
        requires_auth: row.get(9)?,
        open_in_new_tab: row.get(10)?,
        icon_url: row.get(11)?,
    })
}

fn select_all(conn: &Connection) -> Result<Vec<CatalogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM applications ORDER BY display_order ASC, name ASC",
        SELECT_COLUMNS
    ))?;
    let entries = stmt
        .query_map([], row_to_entry)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

fn insert(conn: &Connection, entry: &CatalogEntry) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO applications (id, name, description, url, category, display_order, is_active, \
         background_color, text_color, requires_auth, open_in_new_tab, icon_url, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        params![
            entry.id,
            entry.name,
            entry.description,
            entry.url,
            entry.category,
            entry.display_order,
            entry.is_active,
            entry.background_color,
            entry.text_color,
            entry.requires_auth,
            entry.open_in_new_tab,
            entry.icon_url,
            now,
        ],
    )?;
    Ok(())
}

impl CatalogRepository for SqliteRepository {
    fn label(&self) -> &str {
        "sqlite"
    }

    fn list_all(&self) -> Result<Vec<CatalogEntry>> {
        select_all(&self.conn())
    }

    fn get(&self, id: &str) -> Result<CatalogEntry> {
        Self::load(&self.conn(), id)
    }

    fn create(&self, entry: NewEntry) -> Result<CatalogEntry> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let existing = select_all(&tx)?;
        let created = prepare_new(entry, &existing)?;
        insert(&tx, &created)?;
        tx.commit()?;
        Ok(created)
    }

    fn update(&self, id: &str, patch: EntryPatch) -> Result<CatalogEntry> {
        let conn = self.conn();
        let mut entry = Self::load(&conn, id)?;
        patch.apply(&mut entry);
        validate_entry(&entry)?;

        conn.execute(
            "UPDATE applications SET name = ?2, description = ?3, url = ?4, category = ?5, \
             display_order = ?6, is_active = ?7, background_color = ?8, text_color = ?9, \
             requires_auth = ?10, open_in_new_tab = ?11, icon_url = ?12, updated_at = ?13 \
             WHERE id = ?1",
            params![
                entry.id,
                entry.name,
                entry.description,
                entry.url,
                entry.category,
                entry.display_order,
                entry.is_active,
                entry.background_color,
                entry.text_color,
                entry.requires_auth,
                entry.open_in_new_tab,
                entry.icon_url,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(entry)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let affected = self
            .conn()
            .execute("DELETE FROM applications WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn reorder(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        for (position, id) in ids.iter().enumerate() {
            let affected = tx.execute(
                "UPDATE applications SET display_order = ?1, updated_at = ?2 WHERE id = ?3",
                params![position as i64 + 1, now, id],
            )?;
            if affected == 0 {
                // Dropping the transaction rolls back earlier rows
                return Err(RepositoryError::NotFound(id.clone()));
            }
        }
        tx.commit()?;
        Ok(())
    }
}
