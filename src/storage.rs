use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::config::Config;
use crate::retry::{with_retry, RetryConfig};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

/// Client for the file-storage collaborator. Unlike notifications, upload
/// failures propagate: an export without a stored file has not happened.
#[derive(Clone)]
pub struct StorageClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl StorageClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.storage_url.clone(),
            retry: RetryConfig::collaborator(),
        }
    }

    /// Upload rendered bytes and return the stored file's id.
    pub async fn upload(
        &self,
        tenant: &str,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let url = format!("{}/files", self.base_url);

        let response: UploadResponse = with_retry(&self.retry, "file upload", || {
            let url = url.clone();
            let bytes = bytes.clone();
            async move {
                let response = self
                    .client
                    .post(&url)
                    .header("x-tenant-key", tenant)
                    .header("x-file-name", file_name)
                    .header("Content-Type", content_type)
                    .body(bytes)
                    .send()
                    .await
                    .context("Failed to reach storage endpoint")?;

                if !response.status().is_success() {
                    let status = response.status();
                    anyhow::bail!("Storage endpoint returned {}", status);
                }

                response
                    .json::<UploadResponse>()
                    .await
                    .context("Failed to parse storage response")
            }
        })
        .await?;

        info!(tenant, file_name, file_id = %response.id, "Uploaded export file");
        Ok(response.id)
    }
}
