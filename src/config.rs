use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Completion collaborator
    pub completion_api_url: String,
    pub completion_api_key: String,
    pub completion_model: String,
    pub completion_temperature: f32,
    pub completion_retry_delay: Duration,

    // Collaborator endpoints
    pub notification_url: String,
    pub storage_url: String,

    // Tenancy
    pub root_tenant_id: String,
    pub tenant_salt: String,

    // Document store
    pub database_path: String,

    // Translate-all throttling
    pub max_concurrent_completions: usize,
    pub scan_page_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            // Completion collaborator
            completion_api_url: std::env::var("COMPLETION_API_URL")
                .context("COMPLETION_API_URL not set")?,
            completion_api_key: std::env::var("COMPLETION_API_KEY")
                .context("COMPLETION_API_KEY not set")?,
            completion_model: std::env::var("COMPLETION_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            completion_temperature: std::env::var("COMPLETION_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.1),
            completion_retry_delay: Duration::from_secs(
                std::env::var("COMPLETION_RETRY_DELAY_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            ),

            // Collaborators
            notification_url: std::env::var("NOTIFICATION_URL")
                .context("NOTIFICATION_URL not set")?,
            storage_url: std::env::var("STORAGE_URL").context("STORAGE_URL not set")?,

            // Tenancy
            root_tenant_id: std::env::var("ROOT_TENANT_ID")
                .unwrap_or_else(|_| "root".to_string()),
            tenant_salt: std::env::var("TENANT_SALT").context("TENANT_SALT not set")?,

            // Document store
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/locsync.db".to_string()),

            // Throttling
            max_concurrent_completions: std::env::var("MAX_CONCURRENT_COMPLETIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            scan_page_size: std::env::var("SCAN_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
        })
    }

    /// Config pointing at placeholder endpoints; tests override the
    /// collaborator URLs with a mock server address.
    pub fn for_tests() -> Self {
        Self {
            completion_api_url: "http://localhost/v1/chat/completions".to_string(),
            completion_api_key: "test-completion-key".to_string(),
            completion_model: "gpt-4o-mini".to_string(),
            completion_temperature: 0.1,
            completion_retry_delay: Duration::ZERO,
            notification_url: "http://localhost/notify".to_string(),
            storage_url: "http://localhost/storage".to_string(),
            root_tenant_id: "root".to_string(),
            tenant_salt: "test-salt".to_string(),
            database_path: ":memory:".to_string(),
            max_concurrent_completions: 4,
            scan_page_size: 1000,
        }
    }
}
