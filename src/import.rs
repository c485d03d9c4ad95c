use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::export::{ExportedKey, ExportedResource};
use crate::model::{Key, Module, Resource, TimelineEntry};
use crate::store::Store;
use crate::timeline::TimelineRecorder;

/// Supported import payload encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportFormat {
    Json,
    Csv,
}

#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub modules_created: usize,
}

/// Reads interchange payloads back into the store. JSON and CSV cover the
/// same projections the renderers emit, so export-then-import is a
/// fixpoint on key name, module, routes and resources.
pub struct Importer {
    store: Store,
    timeline: TimelineRecorder,
}

impl Importer {
    pub fn new(store: Store, timeline: TimelineRecorder) -> Self {
        Self { store, timeline }
    }

    pub fn import_json(&self, tenant: &str, bytes: &[u8], user_id: &str) -> Result<ImportReport> {
        let projections: Vec<ExportedKey> =
            serde_json::from_slice(bytes).context("Failed to parse JSON import payload")?;
        self.apply(tenant, projections, user_id)
    }

    pub fn import_csv(&self, tenant: &str, bytes: &[u8], user_id: &str) -> Result<ImportReport> {
        let mut reader = csv::Reader::from_reader(bytes);
        let headers = reader
            .headers()
            .context("Failed to read CSV import header")?
            .clone();

        // Columns after the five identity columns are either culture codes
        // or their paired `<code>_CharacterLength` columns.
        let mut value_columns: Vec<(usize, String)> = Vec::new();
        let mut length_columns: HashMap<String, usize> = HashMap::new();
        for (index, name) in headers.iter().enumerate().skip(5) {
            match name.strip_suffix("_CharacterLength") {
                Some(code) => {
                    length_columns.insert(code.to_string(), index);
                }
                None => value_columns.push((index, name.to_string())),
            }
        }

        let mut projections = Vec::new();
        for record in reader.records() {
            let record = record.context("Failed to read CSV import record")?;

            let mut resources = Vec::new();
            for (index, code) in &value_columns {
                let value = record.get(*index).unwrap_or_default();
                if value.is_empty() {
                    continue;
                }
                let character_length = length_columns
                    .get(code)
                    .and_then(|i| record.get(*i))
                    .and_then(|v| v.parse().ok());
                resources.push(ExportedResource {
                    culture: code.clone(),
                    value: value.to_string(),
                    character_length,
                });
            }

            projections.push(ExportedKey {
                id: record.get(0).unwrap_or_default().to_string(),
                module_id: record.get(1).unwrap_or_default().to_string(),
                value: record.get(2).unwrap_or_default().to_string(),
                module: record.get(3).unwrap_or_default().to_string(),
                key_name: record.get(4).unwrap_or_default().to_string(),
                tenant: String::new(),
                is_partially_translated: false,
                routes: Vec::new(),
                context: None,
                resources,
            });
        }

        self.apply(tenant, projections, user_id)
    }

    fn apply(
        &self,
        tenant: &str,
        projections: Vec<ExportedKey>,
        user_id: &str,
    ) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let mut module_ids: HashMap<String, String> = self
            .store
            .list_modules(tenant)?
            .into_iter()
            .map(|m| (m.name, m.id))
            .collect();

        for projection in projections {
            if projection.key_name.is_empty() || projection.module.is_empty() {
                continue;
            }

            let module_id = match module_ids.get(&projection.module) {
                Some(id) => id.clone(),
                None => {
                    let module = Module::new(&projection.module, tenant, user_id);
                    self.store.save_module(&module)?;
                    module_ids.insert(projection.module.clone(), module.id.clone());
                    report.modules_created += 1;
                    module.id
                }
            };

            let existing = self
                .store
                .find_key_by_name(tenant, &module_id, &projection.key_name)?;

            let (mut key, previous) = match existing {
                Some(existing) => (existing.clone(), Some(existing)),
                None => {
                    let mut key = Key::new(&projection.key_name, &module_id, tenant, user_id);
                    if !projection.id.is_empty() {
                        key.id = projection.id.clone();
                    }
                    (key, None)
                }
            };

            for resource in &projection.resources {
                let mut slot = Resource::new(&resource.culture, &resource.value);
                slot.character_length = resource.character_length;
                key.put_resource(slot);
            }
            if !projection.value.is_empty() {
                key.value = projection.value.clone();
            }
            if !projection.routes.is_empty() {
                key.routes = projection.routes.clone();
            }
            if projection.context.is_some() {
                key.context = projection.context.clone();
            }
            key.updated_by = user_id.to_string();
            key.touch();

            self.store.save_key(&key)?;
            self.timeline
                .record(TimelineEntry::new(key, previous.clone(), "Import", user_id))?;

            match previous {
                Some(_) => report.updated += 1,
                None => report.inserted += 1,
            }
        }

        info!(
            tenant,
            inserted = report.inserted,
            updated = report.updated,
            modules_created = report.modules_created,
            "Import applied"
        );
        Ok(report)
    }
}
