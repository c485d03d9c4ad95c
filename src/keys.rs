use anyhow::Result;
use std::collections::BTreeMap;
use tracing::info;

use crate::error::MutationOutcome;
use crate::model::{timestamp, Key, Module, TimelineEntry};
use crate::store::Store;
use crate::timeline::TimelineRecorder;

/// Result of a validated key write.
#[derive(Debug)]
pub enum KeySaveResult {
    Saved(Key),
    Rejected(MutationOutcome),
}

impl KeySaveResult {
    pub fn saved(&self) -> Option<&Key> {
        match self {
            KeySaveResult::Saved(key) => Some(key),
            KeySaveResult::Rejected(_) => None,
        }
    }
}

/// Validated CRUD over keys and modules, with an audit entry per mutation.
pub struct KeyManager {
    store: Store,
    timeline: TimelineRecorder,
}

impl KeyManager {
    pub fn new(store: Store, timeline: TimelineRecorder) -> Self {
        Self { store, timeline }
    }

    /// Upsert a key by `(module_id, key_name)`. An existing key keeps its
    /// id and created_at; the draft's resources and routing replace the
    /// stored ones.
    pub fn save_key(&self, draft: Key, user_id: &str) -> Result<KeySaveResult> {
        let mut errors = BTreeMap::new();
        if draft.key_name.trim().is_empty() {
            errors.insert("keyName".to_string(), "Key name is required".to_string());
        }
        if draft.module_id.trim().is_empty() {
            errors.insert("moduleId".to_string(), "Module id is required".to_string());
        }
        if draft.tenant.trim().is_empty() {
            errors.insert("tenant".to_string(), "Tenant is required".to_string());
        }
        if !errors.is_empty() {
            return Ok(KeySaveResult::Rejected(MutationOutcome::from_errors(errors)));
        }

        let existing =
            self.store
                .find_key_by_name(&draft.tenant, &draft.module_id, &draft.key_name)?;

        let mut key = draft;
        let previous = existing.clone();
        if let Some(existing) = existing {
            key.id = existing.id;
            key.created_at = existing.created_at;
            key.created_by = existing.created_by;
        }
        key.updated_at = timestamp();
        key.updated_by = user_id.to_string();

        self.store.save_key(&key)?;
        self.timeline.record(TimelineEntry::new(
            key.clone(),
            previous,
            "KeyManagement",
            user_id,
        ))?;

        Ok(KeySaveResult::Saved(key))
    }

    pub fn get_key(&self, tenant: &str, id: &str) -> Result<Option<Key>> {
        self.store.get_key(tenant, id)
    }

    /// Delete a key, logging a final timeline entry first so the deleted
    /// snapshot stays recoverable.
    pub fn delete_key(&self, tenant: &str, id: &str, user_id: &str) -> Result<MutationOutcome> {
        let key = match self.store.get_key(tenant, id)? {
            Some(key) => key,
            None => return Ok(MutationOutcome::failure("id", format!("Key not found: {id}"))),
        };

        self.timeline.record(TimelineEntry::new(
            key.clone(),
            Some(key),
            "KeyDeletion",
            user_id,
        ))?;
        self.store.delete_key(tenant, id)?;
        info!(tenant, key_id = id, "Deleted key");
        Ok(MutationOutcome::success())
    }

    /// Restore the `previous_data` snapshot of a timeline entry. The
    /// restore itself is audited, with `rollback_from` linking back to the
    /// entry it undid.
    pub fn rollback(
        &self,
        tenant: &str,
        timeline_entry_id: &str,
        user_id: &str,
    ) -> Result<MutationOutcome> {
        let entry = match self.timeline.get_by_id(tenant, timeline_entry_id)? {
            Some(entry) => entry,
            None => {
                return Ok(MutationOutcome::failure(
                    "timelineEntryId",
                    format!("Timeline entry not found: {timeline_entry_id}"),
                ))
            }
        };

        let mut restored = match entry.previous_data {
            Some(previous) => previous,
            None => {
                return Ok(MutationOutcome::failure(
                    "previousData",
                    "Timeline entry has no previous snapshot to restore",
                ))
            }
        };

        let current = self.store.get_key(tenant, &restored.id)?;
        restored.updated_at = timestamp();
        restored.updated_by = user_id.to_string();
        self.store.save_key(&restored)?;

        let mut rollback_entry =
            TimelineEntry::new(restored, current, "Rollback", user_id);
        rollback_entry.rollback_from = Some(timeline_entry_id.to_string());
        self.timeline.record(rollback_entry)?;

        Ok(MutationOutcome::success())
    }

    /// Upsert a module by `(tenant, name)`.
    pub fn save_module(&self, draft: Module) -> Result<Module> {
        let mut module = draft;
        if let Some(existing) = self
            .store
            .find_module_by_name(&module.tenant, &module.name)?
        {
            module.id = existing.id;
            module.created_at = existing.created_at;
            module.created_by = existing.created_by;
        }
        module.updated_at = timestamp();
        self.store.save_module(&module)?;
        Ok(module)
    }

    pub fn list_modules(&self, tenant: &str) -> Result<Vec<Module>> {
        self.store.list_modules(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Resource;
    use crate::timeline::TimelineQuery;

    fn manager() -> (KeyManager, Store, TimelineRecorder) {
        let store = Store::in_memory().expect("Should open in-memory store");
        let timeline = TimelineRecorder::new(store.clone());
        (
            KeyManager::new(store.clone(), timeline.clone()),
            store,
            timeline,
        )
    }

    #[test]
    fn test_save_key_rejects_missing_fields() {
        let (manager, _, _) = manager();
        let draft = Key::new("", "", "tenant-a", "alice");

        let result = manager.save_key(draft, "alice").unwrap();
        match result {
            KeySaveResult::Rejected(outcome) => {
                assert!(outcome.errors.contains_key("keyName"));
                assert!(outcome.errors.contains_key("moduleId"));
            }
            KeySaveResult::Saved(_) => panic!("Invalid draft should be rejected"),
        }
    }

    #[test]
    fn test_save_key_upserts_by_name_keeping_id() {
        let (manager, _, _) = manager();
        let mut first = Key::new("cart.total", "mod-1", "tenant-a", "alice");
        first.put_resource(Resource::new("en-US", "Total"));
        let saved = manager.save_key(first, "alice").unwrap();
        let original_id = saved.saved().unwrap().id.clone();

        let mut second = Key::new("cart.total", "mod-1", "tenant-a", "bob");
        second.put_resource(Resource::new("en-US", "Grand total"));
        let saved = manager.save_key(second, "bob").unwrap();
        let key = saved.saved().unwrap();

        assert_eq!(key.id, original_id);
        assert_eq!(key.created_by, "alice");
        assert_eq!(key.updated_by, "bob");
        assert_eq!(key.resource("en-US").unwrap().value, "Grand total");
    }

    #[test]
    fn test_save_key_records_timeline_with_previous() {
        let (manager, _, timeline) = manager();
        let first = Key::new("cart.total", "mod-1", "tenant-a", "alice");
        manager.save_key(first, "alice").unwrap();
        let second = Key::new("cart.total", "mod-1", "tenant-a", "alice");
        manager.save_key(second, "alice").unwrap();

        let (entries, total) = timeline
            .query("tenant-a", &TimelineQuery::default())
            .unwrap();
        assert_eq!(total, 2);
        // Newest entry carries the prior snapshot
        assert!(entries[0].previous_data.is_some());
    }

    #[test]
    fn test_delete_key_not_found_is_structured() {
        let (manager, _, _) = manager();
        let outcome = manager.delete_key("tenant-a", "nope", "alice").unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.errors.contains_key("id"));
    }

    #[test]
    fn test_delete_key_logs_then_removes() {
        let (manager, store, timeline) = manager();
        let saved = manager
            .save_key(Key::new("cart.total", "mod-1", "tenant-a", "alice"), "alice")
            .unwrap();
        let id = saved.saved().unwrap().id.clone();

        let outcome = manager.delete_key("tenant-a", &id, "alice").unwrap();
        assert!(outcome.is_success());
        assert!(store.get_key("tenant-a", &id).unwrap().is_none());

        let query = TimelineQuery {
            entity_id: Some(id),
            ..Default::default()
        };
        let (entries, _) = timeline.query("tenant-a", &query).unwrap();
        assert_eq!(entries[0].log_from, "KeyDeletion");
    }

    #[test]
    fn test_rollback_restores_previous_snapshot() {
        let (manager, store, timeline) = manager();
        let mut first = Key::new("cart.total", "mod-1", "tenant-a", "alice");
        first.put_resource(Resource::new("en-US", "Total"));
        manager.save_key(first, "alice").unwrap();

        let mut second = Key::new("cart.total", "mod-1", "tenant-a", "alice");
        second.put_resource(Resource::new("en-US", "Broken"));
        let key_id = manager
            .save_key(second, "alice")
            .unwrap()
            .saved()
            .unwrap()
            .id
            .clone();

        let query = TimelineQuery {
            entity_id: Some(key_id.clone()),
            ..Default::default()
        };
        let (entries, _) = timeline.query("tenant-a", &query).unwrap();
        let overwrite_entry = entries
            .iter()
            .find(|e| e.previous_data.is_some())
            .unwrap();

        let outcome = manager
            .rollback("tenant-a", &overwrite_entry.id, "alice")
            .unwrap();
        assert!(outcome.is_success());

        let restored = store.get_key("tenant-a", &key_id).unwrap().unwrap();
        assert_eq!(restored.resource("en-US").unwrap().value, "Total");

        let (entries, _) = timeline.query("tenant-a", &query).unwrap();
        let rollback_entry = entries.iter().find(|e| e.log_from == "Rollback").unwrap();
        assert_eq!(
            rollback_entry.rollback_from.as_deref(),
            Some(overwrite_entry.id.as_str())
        );
    }

    #[test]
    fn test_rollback_without_previous_is_rejected() {
        let (manager, _, timeline) = manager();
        let saved = manager
            .save_key(Key::new("cart.total", "mod-1", "tenant-a", "alice"), "alice")
            .unwrap();
        let key_id = saved.saved().unwrap().id.clone();

        let query = TimelineQuery {
            entity_id: Some(key_id),
            ..Default::default()
        };
        let (entries, _) = timeline.query("tenant-a", &query).unwrap();

        let outcome = manager
            .rollback("tenant-a", &entries[0].id, "alice")
            .unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.errors.contains_key("previousData"));
    }

    #[test]
    fn test_save_module_upserts_by_name() {
        let (manager, _, _) = manager();
        let first = manager
            .save_module(Module::new("checkout", "tenant-a", "alice"))
            .unwrap();
        let second = manager
            .save_module(Module::new("checkout", "tenant-a", "bob"))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(manager.list_modules("tenant-a").unwrap().len(), 1);
    }
}
