use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::model::{timestamp, Key, Module, ServiceMigrationStatus, TimelineEntry};
use crate::notify::{Notification, Notifier};
use crate::store::{collections, Store};
use crate::timeline::TimelineRecorder;

/// Queue payload asking for one environment's data to be copied into
/// another. Tenants are explicit on the event; nothing is ambient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationEvent {
    pub tracker_id: String,
    pub source_tenant: String,
    pub target_tenant: String,
    pub project_key: String,
    pub targeted_project_key: String,
    pub overwrite: bool,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub user_id: String,
}

/// What a key migration actually wrote.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub inserted: Vec<Key>,
    pub updated: Vec<Key>,
    pub upserted: Vec<Key>,
}

/// Copies modules and keys between tenant environments, preserving
/// document ids so repeated runs stay idempotent per document.
pub struct BulkSynchronizer {
    store: Store,
    timeline: TimelineRecorder,
    notifier: Notifier,
    root_tenant: String,
}

impl BulkSynchronizer {
    pub fn new(store: Store, timeline: TimelineRecorder, notifier: Notifier, root_tenant: &str) -> Self {
        Self {
            store,
            timeline,
            notifier,
            root_tenant: root_tenant.to_string(),
        }
    }

    /// Modules migrate first so every migrated key's module id resolves in
    /// the target environment.
    pub fn migrate_modules(
        &self,
        source_tenant: &str,
        target_tenant: &str,
        overwrite: bool,
    ) -> Result<()> {
        let modules: Vec<Module> = self.store.list_modules(source_tenant)?;
        info!(
            source = source_tenant,
            target = target_tenant,
            count = modules.len(),
            overwrite,
            "Migrating modules"
        );

        for mut module in modules {
            module.tenant = target_tenant.to_string();
            if overwrite {
                self.store.save_module(&module)?;
            } else {
                self.store
                    .insert_if_absent(target_tenant, collections::MODULES, &module.id, &module)?;
            }
        }
        Ok(())
    }

    pub fn migrate_keys(
        &self,
        source_tenant: &str,
        target_tenant: &str,
        overwrite: bool,
    ) -> Result<MigrationReport> {
        let source_keys: Vec<Key> = self.store.list_keys(source_tenant)?;
        info!(
            source = source_tenant,
            target = target_tenant,
            count = source_keys.len(),
            overwrite,
            "Migrating keys"
        );

        let mut report = MigrationReport::default();
        let mut timeline_entries = Vec::new();

        if overwrite {
            for source_key in source_keys {
                let previous = self.store.get_key(target_tenant, &source_key.id)?;

                let mut key = source_key;
                key.tenant = target_tenant.to_string();
                key.updated_at = timestamp();
                self.store.save_key(&key)?;

                timeline_entries.push(TimelineEntry::new(
                    key.clone(),
                    previous.clone(),
                    "Migration",
                    "migration",
                ));
                match previous {
                    Some(_) => report.updated.push(key.clone()),
                    None => report.inserted.push(key.clone()),
                }
                report.upserted.push(key);
            }
        } else {
            // Read the existing ids first; only the complement is written.
            let ids: Vec<String> = source_keys.iter().map(|k| k.id.clone()).collect();
            let existing = self
                .store
                .existing_ids(target_tenant, collections::KEYS, &ids)?;

            for source_key in source_keys {
                if existing.contains(&source_key.id) {
                    continue;
                }
                let mut key = source_key;
                key.tenant = target_tenant.to_string();
                let written =
                    self.store
                        .insert_if_absent(target_tenant, collections::KEYS, &key.id, &key)?;
                if written {
                    timeline_entries.push(TimelineEntry::new(
                        key.clone(),
                        None,
                        "Migration",
                        "migration",
                    ));
                    report.inserted.push(key.clone());
                    report.upserted.push(key);
                }
            }
        }

        self.timeline.record_bulk(timeline_entries)?;
        Ok(report)
    }

    /// Consumer entry point. On failure the tracker records the error, a
    /// failure notification goes out, and the error re-propagates so the
    /// queue can redeliver.
    pub async fn run(&self, event: &MigrationEvent) -> Result<MigrationReport> {
        let started_at = timestamp();

        let result = self
            .migrate_modules(&event.source_tenant, &event.target_tenant, event.overwrite)
            .and_then(|_| {
                self.migrate_keys(&event.source_tenant, &event.target_tenant, event.overwrite)
            });

        match result {
            Ok(report) => {
                self.record_status(event, started_at, None)?;
                info!(
                    tracker = %event.tracker_id,
                    inserted = report.inserted.len(),
                    updated = report.updated.len(),
                    "Migration completed"
                );
                self.notify(event, "migrationFinished", "completed").await;
                Ok(report)
            }
            Err(e) => {
                error!(tracker = %event.tracker_id, "Migration failed: {e:#}");
                self.record_status(event, started_at, Some(format!("{e:#}")))?;
                self.notify(event, "migrationFinished", "failed").await;
                Err(e).context("Environment migration failed")
            }
        }
    }

    fn record_status(
        &self,
        event: &MigrationEvent,
        started_at: String,
        error_message: Option<String>,
    ) -> Result<()> {
        let status = ServiceMigrationStatus {
            should_overwrite: event.overwrite,
            is_completed: error_message.is_none(),
            started_at: Some(started_at),
            completed_at: Some(timestamp()),
            error_message,
            queue_name: Some("environment-migration".to_string()),
        };
        self.store.update_tracker_language_status(
            &self.root_tenant,
            &event.tracker_id,
            &event.project_key,
            &event.targeted_project_key,
            status,
        )
    }

    async fn notify(&self, event: &MigrationEvent, key: &str, value: &str) {
        let notification = Notification::new(&event.connection_id, &event.user_id, key)
            .with_response_value(value);
        self.notifier.send(&event.target_tenant, &notification).await;
    }
}
