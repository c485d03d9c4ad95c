use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Culture code of the reserved metadata slot. A resource carrying this
/// culture holds a type hint, not a translation, and must stay out of the
/// translation matrix and every export.
pub const TYPE_CULTURE: &str = "type";

/// Legacy sentinel some producers wrote into a resource value to mean
/// "reset me". Deserialization maps it onto `ResourceStatus::NeedsReset`
/// so the rest of the engine never compares against the magic string.
pub const RESERVED_SENTINEL: &str = "KEY_MISSING";

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Explicit fill state of a resource value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ResourceStatus {
    Filled,
    #[default]
    Empty,
    /// The value held the reserved sentinel and must be blanked before the
    /// key re-enters the translation matrix.
    NeedsReset,
}

/// One language's value for a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawResource")]
pub struct Resource {
    pub culture: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_length: Option<u32>,
    #[serde(default)]
    pub status: ResourceStatus,
}

/// Wire shape of a resource. Older payloads carry neither a status field
/// nor a cleared sentinel, so the status is derived from the value here.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResource {
    culture: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    character_length: Option<u32>,
    #[serde(default)]
    status: Option<ResourceStatus>,
}

impl From<RawResource> for Resource {
    fn from(raw: RawResource) -> Self {
        let status = match raw.status {
            Some(status) => status,
            None => derive_status(&raw.value),
        };
        Self {
            culture: raw.culture,
            value: raw.value,
            character_length: raw.character_length,
            status,
        }
    }
}

fn derive_status(value: &str) -> ResourceStatus {
    if value.eq_ignore_ascii_case(RESERVED_SENTINEL) {
        ResourceStatus::NeedsReset
    } else if value.is_empty() {
        ResourceStatus::Empty
    } else {
        ResourceStatus::Filled
    }
}

impl Resource {
    pub fn new(culture: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        let status = derive_status(&value);
        Self {
            culture: culture.into(),
            value,
            character_length: None,
            status,
        }
    }

    /// Placeholder for a culture that has no entry yet.
    pub fn placeholder(culture: impl Into<String>) -> Self {
        Self {
            culture: culture.into(),
            value: String::new(),
            character_length: None,
            status: ResourceStatus::Empty,
        }
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.status = derive_status(&self.value);
    }

    pub fn is_filled(&self) -> bool {
        self.status == ResourceStatus::Filled && !self.value.is_empty()
    }

    /// True for slots that take part in the translation matrix and exports.
    pub fn is_translatable(&self) -> bool {
        self.culture != TYPE_CULTURE
    }
}

/// A logical grouping of keys (an application area).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub name: String,
    pub tenant: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_by: String,
}

impl Module {
    pub fn new(name: impl Into<String>, tenant: impl Into<String>, actor: &str) -> Self {
        let now = now_rfc3339();
        Self {
            id: new_id(),
            name: name.into(),
            tenant: tenant.into(),
            created_at: now.clone(),
            updated_at: now,
            created_by: actor.to_string(),
            updated_by: actor.to_string(),
        }
    }
}

/// A configured language for a tenant. Exactly one per tenant is the
/// default; `store::set_default_language` enforces the swap atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Language {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    pub tenant: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Language {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        tenant: impl Into<String>,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            id: new_id(),
            code: code.into(),
            name: name.into(),
            is_default: false,
            tenant: tenant.into(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A translatable UI string with one resource slot per language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    pub id: String,
    pub key_name: String,
    pub module_id: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub routes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub is_partially_translated: bool,
    pub tenant: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_by: String,
}

impl Key {
    pub fn new(
        key_name: impl Into<String>,
        module_id: impl Into<String>,
        tenant: impl Into<String>,
        actor: &str,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            id: new_id(),
            key_name: key_name.into(),
            module_id: module_id.into(),
            value: String::new(),
            resources: Vec::new(),
            routes: Vec::new(),
            context: None,
            is_partially_translated: false,
            tenant: tenant.into(),
            created_at: now.clone(),
            updated_at: now,
            created_by: actor.to_string(),
            updated_by: actor.to_string(),
        }
    }

    pub fn resource(&self, culture: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.culture == culture)
    }

    pub fn resource_mut(&mut self, culture: &str) -> Option<&mut Resource> {
        self.resources.iter_mut().find(|r| r.culture == culture)
    }

    /// Insert or replace the resource for a culture.
    pub fn put_resource(&mut self, resource: Resource) {
        if let Some(slot) = self.resource_mut(&resource.culture) {
            *slot = resource;
        } else {
            self.resources.push(resource);
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_rfc3339();
    }
}

/// Point-in-time audit record for one key mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    #[serde(default)]
    pub id: String,
    pub entity_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub current_data: Key,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_data: Option<Key>,
    pub log_from: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_from: Option<String>,
}

impl TimelineEntry {
    pub fn new(current: Key, previous: Option<Key>, log_from: &str, user_id: &str) -> Self {
        let now = now_rfc3339();
        Self {
            id: String::new(),
            entity_id: current.id.clone(),
            created_at: now.clone(),
            updated_at: now,
            current_data: current,
            previous_data: previous,
            log_from: log_from.to_string(),
            user_id: user_id.to_string(),
            rollback_from: None,
        }
    }
}

/// Per-service completion status inside a migration tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMigrationStatus {
    pub should_overwrite: bool,
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_name: Option<String>,
}

/// One tracker per migration run; each participating service reports its
/// own completion independently (eventually consistent, not transactional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationTracker {
    pub id: String,
    pub project_key: String,
    pub targeted_project_key: String,
    #[serde(default)]
    pub tenant_group_id: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_service: Option<ServiceMigrationStatus>,
}

impl MigrationTracker {
    pub fn new(project_key: &str, targeted_project_key: &str) -> Self {
        Self {
            id: new_id(),
            project_key: project_key.to_string(),
            targeted_project_key: targeted_project_key.to_string(),
            tenant_group_id: String::new(),
            started_at: now_rfc3339(),
            completed_at: None,
            error_message: None,
            language_service: None,
        }
    }
}

/// Timestamp helper shared by the engine (RFC 3339, UTC).
pub fn timestamp() -> String {
    now_rfc3339()
}

/// Parse an engine timestamp back into a `DateTime` for range filters.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
