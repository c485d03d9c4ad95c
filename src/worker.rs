use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::completion::TranslationCompleter;
use crate::config::Config;
use crate::export::{self, ExportFormat, ExportInput};
use crate::import::{ImportFormat, Importer};
use crate::migration::{BulkSynchronizer, MigrationEvent};
use crate::notify::{Notification, Notifier};
use crate::storage::StorageClient;
use crate::store::Store;
use crate::timeline::TimelineRecorder;
use crate::translate::Translator;

/// Events consumed from the job queue. Delivery is at-least-once, so every
/// handler must tolerate re-running.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueueEvent {
    #[serde(rename_all = "camelCase")]
    GenerateExportFiles {
        tenant: String,
        format: ExportFormat,
        connection_id: String,
        user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    TranslateAll {
        tenant: String,
        #[serde(default)]
        connection_id: String,
        user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    TranslateKey {
        tenant: String,
        key_id: String,
        #[serde(default)]
        connection_id: String,
        user_id: String,
    },
    MigrateEnvironment(MigrationEvent),
    #[serde(rename_all = "camelCase")]
    ImportFile {
        tenant: String,
        format: ImportFormat,
        #[serde(with = "serde_bytes_base64")]
        bytes: Vec<u8>,
        connection_id: String,
        user_id: String,
    },
}

/// Base64 transport for binary import payloads on the queue.
mod serde_bytes_base64 {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        BASE64.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Consumes queue events and dispatches them onto the engine components.
pub struct Worker {
    store: Store,
    translator: Translator,
    synchronizer: BulkSynchronizer,
    importer: Importer,
    storage: StorageClient,
    notifier: Notifier,
}

impl Worker {
    pub fn new(config: &Config, store: Store) -> Self {
        let timeline = TimelineRecorder::new(store.clone());
        let notifier = Notifier::new(config);
        Self {
            translator: Translator::new(
                store.clone(),
                timeline.clone(),
                TranslationCompleter::new(config),
                config.max_concurrent_completions,
                config.scan_page_size,
            ),
            synchronizer: BulkSynchronizer::new(
                store.clone(),
                timeline.clone(),
                notifier.clone(),
                &config.root_tenant_id,
            ),
            importer: Importer::new(store.clone(), timeline),
            storage: StorageClient::new(config),
            notifier,
            store,
        }
    }

    /// Consume events until the channel closes.
    pub async fn run(self, mut rx: mpsc::Receiver<QueueEvent>) {
        info!("Worker started");
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }
        info!("Worker stopped: queue closed");
    }

    /// One event. Failures are logged, never panicked: the queue is the
    /// retry mechanism.
    pub async fn handle(&self, event: QueueEvent) {
        let result = match event {
            QueueEvent::GenerateExportFiles {
                tenant,
                format,
                connection_id,
                user_id,
            } => {
                self.handle_export(&tenant, format, &connection_id, &user_id)
                    .await
            }
            QueueEvent::TranslateAll {
                tenant,
                connection_id,
                user_id,
            } => {
                self.handle_translate_all(&tenant, &connection_id, &user_id)
                    .await
            }
            QueueEvent::TranslateKey {
                tenant,
                key_id,
                connection_id,
                user_id,
            } => {
                self.handle_translate_key(&tenant, &key_id, &connection_id, &user_id)
                    .await
            }
            QueueEvent::MigrateEnvironment(event) => {
                self.synchronizer.run(&event).await.map(|_| ())
            }
            QueueEvent::ImportFile {
                tenant,
                format,
                bytes,
                connection_id,
                user_id,
            } => {
                self.handle_import(&tenant, format, &bytes, &connection_id, &user_id)
                    .await
            }
        };

        if let Err(e) = result {
            error!("Event handling failed: {e:#}");
        }
    }

    async fn handle_translate_all(
        &self,
        tenant: &str,
        connection_id: &str,
        user_id: &str,
    ) -> Result<()> {
        match self.translator.translate_all(tenant, user_id).await {
            Ok(summary) => {
                self.notifier
                    .send(
                        tenant,
                        &Notification::new(connection_id, user_id, "translateAllFinished")
                            .with_response_value("completed")
                            .with_payload(&serde_json::json!({
                                "keysProcessed": summary.keys_processed,
                                "resourcesFilled": summary.resources_filled,
                            })),
                    )
                    .await;
                Ok(())
            }
            Err(e) => {
                self.notifier
                    .send(
                        tenant,
                        &Notification::new(connection_id, user_id, "translateAllFinished")
                            .with_response_value("failed"),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn handle_translate_key(
        &self,
        tenant: &str,
        key_id: &str,
        connection_id: &str,
        user_id: &str,
    ) -> Result<()> {
        match self.translator.translate_key(tenant, key_id, user_id).await {
            Ok(summary) => {
                self.notifier
                    .send(
                        tenant,
                        &Notification::new(connection_id, user_id, "translateKeyFinished")
                            .with_response_value("completed")
                            .with_payload(&serde_json::json!({
                                "keyId": key_id,
                                "resourcesFilled": summary.resources_filled,
                            })),
                    )
                    .await;
                Ok(())
            }
            Err(e) => {
                self.notifier
                    .send(
                        tenant,
                        &Notification::new(connection_id, user_id, "translateKeyFinished")
                            .with_response_value("failed"),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn handle_export(
        &self,
        tenant: &str,
        format: ExportFormat,
        connection_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let languages = self.store.list_languages(tenant)?;
        let default_code = languages
            .iter()
            .find(|l| l.is_default)
            .map(|l| l.code.clone())
            .context("Tenant has no default language configured")?;
        let modules = self.store.list_modules(tenant)?;
        let keys = self.store.list_keys(tenant)?;

        let input = ExportInput {
            languages: &languages,
            modules: &modules,
            keys: &keys,
            default_code: &default_code,
            reference_translations: None,
        };

        let bytes = match export::render(format, &input) {
            Some(bytes) => bytes,
            None => {
                self.notifier
                    .send(
                        tenant,
                        &Notification::new(connection_id, user_id, "exportFinished")
                            .with_response_value("failed"),
                    )
                    .await;
                anyhow::bail!("Export rendering produced no output");
            }
        };

        let file_id = match self
            .storage
            .upload(tenant, format.file_name(), format.content_type(), bytes)
            .await
        {
            Ok(file_id) => file_id,
            Err(e) => {
                self.notifier
                    .send(
                        tenant,
                        &Notification::new(connection_id, user_id, "exportFinished")
                            .with_response_value("failed"),
                    )
                    .await;
                return Err(e);
            }
        };

        self.notifier
            .send(
                tenant,
                &Notification::new(connection_id, user_id, "exportFinished")
                    .with_response_value("completed")
                    .with_payload(&serde_json::json!({
                        "fileId": file_id,
                        "fileName": format.file_name(),
                    })),
            )
            .await;
        Ok(())
    }

    async fn handle_import(
        &self,
        tenant: &str,
        format: ImportFormat,
        bytes: &[u8],
        connection_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let result = match format {
            ImportFormat::Json => self.importer.import_json(tenant, bytes, user_id),
            ImportFormat::Csv => self.importer.import_csv(tenant, bytes, user_id),
        };
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                self.notifier
                    .send(
                        tenant,
                        &Notification::new(connection_id, user_id, "importFinished")
                            .with_response_value("failed"),
                    )
                    .await;
                return Err(e);
            }
        };

        self.notifier
            .send(
                tenant,
                &Notification::new(connection_id, user_id, "importFinished")
                    .with_response_value("completed")
                    .with_payload(&report),
            )
            .await;
        Ok(())
    }
}
