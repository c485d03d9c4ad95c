use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::completion::{SuggestionRequest, TranslationCompleter};
use crate::gaps;
use crate::model::{Key, Language, TimelineEntry};
use crate::store::Store;
use crate::timeline::TimelineRecorder;

#[derive(Debug, Default)]
pub struct TranslationSummary {
    pub keys_processed: usize,
    pub resources_filled: usize,
}

/// Fills translation gaps with completion suggestions. Completion calls
/// are bounded by a shared semaphore; each key's write targets one
/// document, so no cross-key coordination is needed.
pub struct Translator {
    store: Store,
    timeline: TimelineRecorder,
    completer: Arc<TranslationCompleter>,
    semaphore: Arc<Semaphore>,
    page_size: usize,
}

impl Translator {
    pub fn new(
        store: Store,
        timeline: TimelineRecorder,
        completer: TranslationCompleter,
        max_concurrent: usize,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            timeline,
            completer: Arc::new(completer),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            page_size,
        }
    }

    /// Translate one key by id.
    pub async fn translate_key(
        &self,
        tenant: &str,
        key_id: &str,
        user_id: &str,
    ) -> Result<TranslationSummary> {
        let languages = self.store.list_languages(tenant)?;
        let default_code = default_code(&languages)
            .context("Tenant has no default language configured")?;

        let key = self.store.get_key(tenant, key_id)?.ok_or_else(|| {
            crate::error::EngineError::NotFound {
                entity: "Key",
                id: key_id.to_string(),
            }
        })?;

        let mut summary = TranslationSummary::default();
        summary.resources_filled = self
            .translate_one(key, &languages, &default_code, user_id)
            .await?;
        summary.keys_processed = 1;
        Ok(summary)
    }

    /// Translate every key in the tenant, one store page at a time. A
    /// failed key is logged and skipped; the batch always runs to the end.
    pub async fn translate_all(&self, tenant: &str, user_id: &str) -> Result<TranslationSummary> {
        let languages = self.store.list_languages(tenant)?;
        let default_code = default_code(&languages)
            .context("Tenant has no default language configured")?;

        let mut summary = TranslationSummary::default();
        let mut page = 0;
        loop {
            let keys = self.store.list_keys_page(tenant, page, self.page_size)?;
            if keys.is_empty() {
                break;
            }

            for key in keys {
                let key_id = key.id.clone();
                match self
                    .translate_one(key, &languages, &default_code, user_id)
                    .await
                {
                    Ok(filled) => {
                        summary.keys_processed += 1;
                        summary.resources_filled += filled;
                    }
                    Err(e) => {
                        warn!(tenant, key_id, "Skipping key after translation error: {e:#}");
                    }
                }
            }
            page += 1;
        }

        info!(
            tenant,
            keys = summary.keys_processed,
            filled = summary.resources_filled,
            "Translation sweep finished"
        );
        Ok(summary)
    }

    /// Returns how many resources were filled on this key.
    async fn translate_one(
        &self,
        mut key: Key,
        languages: &[Language],
        default_code: &str,
        user_id: &str,
    ) -> Result<usize> {
        let previous = key.clone();

        // A reset default blanks the whole matrix; with no source text
        // left there is nothing to translate this round.
        if gaps::clear_reserved_resources(&mut key, default_code) {
            key.touch();
            self.store.save_key(&key)?;
            self.timeline.record(TimelineEntry::new(
                key,
                Some(previous),
                "Translation",
                user_id,
            ))?;
            return Ok(0);
        }

        let mut missing = gaps::find_missing(&key, languages, default_code);
        gaps::compare_and_add_resources(&mut missing, &key.resources, languages);
        if missing.is_empty() {
            return Ok(0);
        }

        let source_value = key
            .resource(default_code)
            .map(|r| r.value.clone())
            .unwrap_or_default();
        let source_language = language_name(languages, default_code);

        let suggestions = join_all(missing.into_iter().map(|resource| {
            let completer = self.completer.clone();
            let semaphore = self.semaphore.clone();
            let request = SuggestionRequest {
                source_text: source_value.clone(),
                source_language: source_language.clone(),
                target_language: language_name(languages, &resource.culture),
                context: key.context.clone(),
            };
            async move {
                let _permit = semaphore.acquire().await.expect("Semaphore never closes");
                let suggestion = if request.source_text.is_empty() {
                    None
                } else {
                    completer.suggest(&request).await
                };
                (resource, suggestion)
            }
        }))
        .await;

        let mut filled = 0;
        for (mut resource, suggestion) in suggestions {
            if let Some(value) = suggestion {
                resource.set_value(value);
                filled += 1;
            }
            key.put_resource(resource);
        }

        key.is_partially_translated = languages
            .iter()
            .filter(|l| l.code != default_code)
            .any(|l| key.resource(&l.code).map(|r| !r.is_filled()).unwrap_or(true));
        key.touch();

        self.store.save_key(&key)?;
        self.timeline.record(TimelineEntry::new(
            key,
            Some(previous),
            "Translation",
            user_id,
        ))?;
        Ok(filled)
    }
}

fn default_code(languages: &[Language]) -> Option<String> {
    languages
        .iter()
        .find(|l| l.is_default)
        .map(|l| l.code.clone())
}

fn language_name(languages: &[Language], code: &str) -> String {
    languages
        .iter()
        .find(|l| l.code == code)
        .map(|l| l.name.clone())
        .unwrap_or_else(|| code.to_string())
}
