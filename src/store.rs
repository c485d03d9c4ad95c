use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::model::{timestamp, Key, Language, MigrationTracker, Module, ServiceMigrationStatus};

/// Collection names, addressed the same way across every tenant.
pub mod collections {
    pub const MODULES: &str = "Modules";
    pub const KEYS: &str = "Keys";
    pub const LANGUAGES: &str = "Languages";
    pub const KEY_TIMELINES: &str = "KeyTimelines";
    pub const MIGRATION_TRACKERS: &str = "MigrationTrackers";
}

/// Embedded document store. Per-tenant logical collections are rows in a
/// single `documents` table keyed by `(tenant, collection, id)` with JSON
/// bodies, so every write targets exactly one document and is naturally
/// serialized per id.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the store at the given path.
    pub fn new(database_path: &str) -> Result<Self> {
        let conn = Connection::open(database_path)
            .context(format!("Failed to open database at {}", database_path))?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                tenant TEXT NOT NULL,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (tenant, collection, id)
            )",
            [],
        )
        .context("Failed to create documents table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Replace-or-insert a document unconditionally (full replace).
    pub fn upsert<T: Serialize>(
        &self,
        tenant: &str,
        collection: &str,
        id: &str,
        doc: &T,
    ) -> Result<()> {
        let body = serde_json::to_string(doc)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO documents (tenant, collection, id, body)
             VALUES (?1, ?2, ?3, ?4)",
            params![tenant, collection, id, body],
        )
        .context("Failed to upsert document")?;
        Ok(())
    }

    /// Insert only if the id does not already exist. Returns whether a row
    /// was written; existing documents are never touched.
    pub fn insert_if_absent<T: Serialize>(
        &self,
        tenant: &str,
        collection: &str,
        id: &str,
        doc: &T,
    ) -> Result<bool> {
        let body = serde_json::to_string(doc)?;
        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO documents (tenant, collection, id, body)
                 VALUES (?1, ?2, ?3, ?4)",
                params![tenant, collection, id, body],
            )
            .context("Failed to insert document")?;
        Ok(rows > 0)
    }

    pub fn get<T: DeserializeOwned>(
        &self,
        tenant: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>> {
        let conn = self.conn.lock().unwrap();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE tenant = ?1 AND collection = ?2 AND id = ?3",
                params![tenant, collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// All documents of a collection, in insertion-id order.
    pub fn list<T: DeserializeOwned>(&self, tenant: &str, collection: &str) -> Result<Vec<T>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT body FROM documents WHERE tenant = ?1 AND collection = ?2 ORDER BY id",
        )?;
        let bodies = stmt
            .query_map(params![tenant, collection], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).context("Failed to parse document body"))
            .collect()
    }

    /// One page of a collection; `page` is zero-based.
    pub fn list_page<T: DeserializeOwned>(
        &self,
        tenant: &str,
        collection: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<T>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT body FROM documents WHERE tenant = ?1 AND collection = ?2
             ORDER BY id LIMIT ?3 OFFSET ?4",
        )?;
        let bodies = stmt
            .query_map(
                params![tenant, collection, page_size as i64, (page * page_size) as i64],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).context("Failed to parse document body"))
            .collect()
    }

    pub fn delete(&self, tenant: &str, collection: &str, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute(
                "DELETE FROM documents WHERE tenant = ?1 AND collection = ?2 AND id = ?3",
                params![tenant, collection, id],
            )
            .context("Failed to delete document")?;
        Ok(rows > 0)
    }

    /// Which of the given ids already exist in the target collection. Used
    /// by insert-only migration to compute the complement before writing.
    pub fn existing_ids(
        &self,
        tenant: &str,
        collection: &str,
        ids: &[String],
    ) -> Result<HashSet<String>> {
        let mut existing = HashSet::new();
        if ids.is_empty() {
            return Ok(existing);
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT 1 FROM documents WHERE tenant = ?1 AND collection = ?2 AND id = ?3",
        )?;
        for id in ids {
            let found: Option<i64> = stmt
                .query_row(params![tenant, collection, id], |row| row.get(0))
                .optional()?;
            if found.is_some() {
                existing.insert(id.clone());
            }
        }
        Ok(existing)
    }

    pub fn count(&self, tenant: &str, collection: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE tenant = ?1 AND collection = ?2",
            params![tenant, collection],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ==================== Modules ====================

    pub fn save_module(&self, module: &Module) -> Result<()> {
        self.upsert(&module.tenant, collections::MODULES, &module.id, module)
    }

    pub fn find_module_by_name(&self, tenant: &str, name: &str) -> Result<Option<Module>> {
        let modules: Vec<Module> = self.list(tenant, collections::MODULES)?;
        Ok(modules.into_iter().find(|m| m.name == name))
    }

    pub fn list_modules(&self, tenant: &str) -> Result<Vec<Module>> {
        self.list(tenant, collections::MODULES)
    }

    pub fn get_module(&self, tenant: &str, id: &str) -> Result<Option<Module>> {
        self.get(tenant, collections::MODULES, id)
    }

    // ==================== Languages ====================

    pub fn save_language(&self, language: &Language) -> Result<()> {
        self.upsert(
            &language.tenant,
            collections::LANGUAGES,
            &language.id,
            language,
        )
    }

    pub fn find_language_by_name(&self, tenant: &str, name: &str) -> Result<Option<Language>> {
        let languages: Vec<Language> = self.list(tenant, collections::LANGUAGES)?;
        Ok(languages.into_iter().find(|l| l.name == name))
    }

    pub fn list_languages(&self, tenant: &str) -> Result<Vec<Language>> {
        self.list(tenant, collections::LANGUAGES)
    }

    pub fn default_language(&self, tenant: &str) -> Result<Option<Language>> {
        let languages: Vec<Language> = self.list(tenant, collections::LANGUAGES)?;
        Ok(languages.into_iter().find(|l| l.is_default))
    }

    /// Swap the tenant's default language in a single transaction, so there
    /// is no window with zero or two defaults. Returns false when the
    /// target language does not exist.
    pub fn set_default_language(&self, tenant: &str, language_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT body FROM documents WHERE tenant = ?1 AND collection = ?2 ORDER BY id",
        )?;
        let bodies = stmt
            .query_map(params![tenant, collections::LANGUAGES], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        let mut languages = bodies
            .iter()
            .map(|body| serde_json::from_str::<Language>(body))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to parse language body")?;

        if !languages.iter().any(|l| l.id == language_id) {
            return Ok(false);
        }

        conn.execute("BEGIN TRANSACTION", [])?;
        let result = (|| -> Result<()> {
            for language in &mut languages {
                let should_be_default = language.id == language_id;
                if language.is_default != should_be_default {
                    language.is_default = should_be_default;
                    language.updated_at = timestamp();
                    let body = serde_json::to_string(language)?;
                    conn.execute(
                        "UPDATE documents SET body = ?1
                         WHERE tenant = ?2 AND collection = ?3 AND id = ?4",
                        params![body, tenant, collections::LANGUAGES, language.id],
                    )?;
                }
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                Ok(true)
            }
            Err(e) => {
                conn.execute("ROLLBACK", [])?;
                Err(e).context("Default language swap failed and was rolled back")
            }
        }
    }

    // ==================== Keys ====================

    pub fn save_key(&self, key: &Key) -> Result<()> {
        self.upsert(&key.tenant, collections::KEYS, &key.id, key)
    }

    pub fn get_key(&self, tenant: &str, id: &str) -> Result<Option<Key>> {
        self.get(tenant, collections::KEYS, id)
    }

    pub fn find_key_by_name(
        &self,
        tenant: &str,
        module_id: &str,
        key_name: &str,
    ) -> Result<Option<Key>> {
        let keys: Vec<Key> = self.list(tenant, collections::KEYS)?;
        Ok(keys
            .into_iter()
            .find(|k| k.module_id == module_id && k.key_name == key_name))
    }

    pub fn list_keys(&self, tenant: &str) -> Result<Vec<Key>> {
        self.list(tenant, collections::KEYS)
    }

    pub fn list_keys_page(&self, tenant: &str, page: usize, page_size: usize) -> Result<Vec<Key>> {
        self.list_page(tenant, collections::KEYS, page, page_size)
    }

    pub fn list_keys_by_module(&self, tenant: &str, module_id: &str) -> Result<Vec<Key>> {
        let keys: Vec<Key> = self.list(tenant, collections::KEYS)?;
        Ok(keys.into_iter().filter(|k| k.module_id == module_id).collect())
    }

    pub fn delete_key(&self, tenant: &str, id: &str) -> Result<bool> {
        self.delete(tenant, collections::KEYS, id)
    }

    // ==================== Migration trackers ====================

    /// Trackers live in the root tenant's database: every environment
    /// participating in a migration reports into the same document.
    pub fn save_tracker(&self, root_tenant: &str, tracker: &MigrationTracker) -> Result<()> {
        self.upsert(
            root_tenant,
            collections::MIGRATION_TRACKERS,
            &tracker.id,
            tracker,
        )
    }

    pub fn get_tracker(&self, root_tenant: &str, id: &str) -> Result<Option<MigrationTracker>> {
        self.get(root_tenant, collections::MIGRATION_TRACKERS, id)
    }

    /// Record this service's migration status on the shared tracker,
    /// creating the tracker document if no other service has yet.
    pub fn update_tracker_language_status(
        &self,
        root_tenant: &str,
        tracker_id: &str,
        project_key: &str,
        targeted_project_key: &str,
        status: ServiceMigrationStatus,
    ) -> Result<()> {
        let mut tracker = self
            .get_tracker(root_tenant, tracker_id)?
            .unwrap_or_else(|| {
                let mut t = MigrationTracker::new(project_key, targeted_project_key);
                t.id = tracker_id.to_string();
                t
            });
        tracker.language_service = Some(status);
        self.save_tracker(root_tenant, &tracker)
    }
}
