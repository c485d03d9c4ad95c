use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::{new_id, parse_timestamp, timestamp, TimelineEntry};
use crate::store::{collections, Store};

/// Filter and pagination for timeline reads. `page` is one-based.
#[derive(Debug, Clone)]
pub struct TimelineQuery {
    pub entity_id: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: usize,
    pub page_size: usize,
}

impl Default for TimelineQuery {
    fn default() -> Self {
        Self {
            entity_id: None,
            user_id: None,
            from: None,
            to: None,
            page: 1,
            page_size: 50,
        }
    }
}

/// Audit log over key mutations.
#[derive(Clone)]
pub struct TimelineRecorder {
    store: Store,
}

impl TimelineRecorder {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Persist one entry. An empty id means a fresh insert with a generated
    /// id; a supplied id amends the existing entry in place (rollback
    /// chains reuse this). Returns the entry's id.
    pub fn record(&self, mut entry: TimelineEntry) -> Result<String> {
        let tenant = entry.current_data.tenant.clone();
        if entry.id.is_empty() {
            entry.id = new_id();
        } else {
            entry.updated_at = timestamp();
        }
        self.store
            .upsert(&tenant, collections::KEY_TIMELINES, &entry.id, &entry)?;
        Ok(entry.id)
    }

    /// Insert-many for bulk operations; every entry gets a fresh id.
    pub fn record_bulk(&self, entries: Vec<TimelineEntry>) -> Result<()> {
        for entry in entries {
            let tenant = entry.current_data.tenant.clone();
            let mut entry = entry;
            entry.id = new_id();
            self.store
                .upsert(&tenant, collections::KEY_TIMELINES, &entry.id, &entry)?;
        }
        Ok(())
    }

    pub fn get_by_id(&self, tenant: &str, id: &str) -> Result<Option<TimelineEntry>> {
        self.store.get(tenant, collections::KEY_TIMELINES, id)
    }

    /// Filtered, paginated read. Entries come back newest first; the second
    /// element is the total match count before pagination.
    pub fn query(&self, tenant: &str, query: &TimelineQuery) -> Result<(Vec<TimelineEntry>, u64)> {
        let mut entries: Vec<TimelineEntry> =
            self.store.list(tenant, collections::KEY_TIMELINES)?;

        entries.retain(|entry| {
            if let Some(entity_id) = &query.entity_id {
                if &entry.entity_id != entity_id {
                    return false;
                }
            }
            if let Some(user_id) = &query.user_id {
                if &entry.user_id != user_id {
                    return false;
                }
            }
            if query.from.is_some() || query.to.is_some() {
                let created = match parse_timestamp(&entry.created_at) {
                    Some(created) => created,
                    None => return false,
                };
                if let Some(from) = query.from {
                    if created < from {
                        return false;
                    }
                }
                if let Some(to) = query.to {
                    if created > to {
                        return false;
                    }
                }
            }
            true
        });

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = entries.len() as u64;

        let page = query.page.max(1);
        let skip = (page - 1) * query.page_size;
        let page_entries = entries
            .into_iter()
            .skip(skip)
            .take(query.page_size)
            .collect();

        Ok((page_entries, total))
    }
}
