use anyhow::Result;
use std::collections::BTreeMap;
use tracing::info;

use crate::error::MutationOutcome;
use crate::model::{timestamp, Language};
use crate::store::Store;

/// Language configuration for a tenant.
pub struct LanguageManager {
    store: Store,
}

impl LanguageManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Upsert a language by name. The first language a tenant configures
    /// becomes the default automatically.
    pub fn save_language(&self, draft: Language) -> Result<MutationOutcome> {
        let mut errors = BTreeMap::new();
        if draft.code.trim().is_empty() {
            errors.insert("code".to_string(), "Language code is required".to_string());
        }
        if draft.name.trim().is_empty() {
            errors.insert("name".to_string(), "Language name is required".to_string());
        }
        if draft.tenant.trim().is_empty() {
            errors.insert("tenant".to_string(), "Tenant is required".to_string());
        }
        if !errors.is_empty() {
            return Ok(MutationOutcome::from_errors(errors));
        }

        let mut language = draft;
        if let Some(existing) = self
            .store
            .find_language_by_name(&language.tenant, &language.name)?
        {
            language.id = existing.id;
            language.created_at = existing.created_at;
            language.is_default = existing.is_default;
        } else if self.store.list_languages(&language.tenant)?.is_empty() {
            language.is_default = true;
        }
        language.updated_at = timestamp();

        self.store.save_language(&language)?;
        info!(tenant = %language.tenant, code = %language.code, "Saved language");
        Ok(MutationOutcome::success())
    }

    pub fn list_languages(&self, tenant: &str) -> Result<Vec<Language>> {
        self.store.list_languages(tenant)
    }

    pub fn default_language(&self, tenant: &str) -> Result<Option<Language>> {
        self.store.default_language(tenant)
    }

    /// Make another configured language the tenant default. The swap is a
    /// single transaction in the store; there is never a moment with zero
    /// or two defaults.
    pub fn set_default_language(&self, tenant: &str, language_id: &str) -> Result<MutationOutcome> {
        if self.store.set_default_language(tenant, language_id)? {
            info!(tenant, language_id, "Changed default language");
            Ok(MutationOutcome::success())
        } else {
            Ok(MutationOutcome::failure(
                "languageId",
                format!("Language not found: {language_id}"),
            ))
        }
    }
}
