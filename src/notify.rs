use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::Config;

/// Payload delivered to the notification collaborator, which relays it to
/// connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub connection_id: String,
    pub user_ids: Vec<String>,
    pub serialized_payload: String,
    pub response_key: String,
    pub response_value: String,
}

impl Notification {
    pub fn new(connection_id: &str, user_id: &str, response_key: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            user_ids: vec![user_id.to_string()],
            serialized_payload: String::new(),
            response_key: response_key.to_string(),
            response_value: String::new(),
        }
    }

    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.serialized_payload = serde_json::to_string(payload).unwrap_or_default();
        self
    }

    pub fn with_response_value(mut self, value: &str) -> Self {
        self.response_value = value.to_string();
        self
    }
}

/// Fire-and-forget client for the notification collaborator. Delivery
/// failures are logged and swallowed: a lost notification never fails the
/// job that produced it.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    url: String,
    salt: String,
}

impl Notifier {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.notification_url.clone(),
            salt: config.tenant_salt.clone(),
        }
    }

    pub async fn send(&self, tenant: &str, notification: &Notification) {
        let result = self
            .client
            .post(&self.url)
            .header("x-tenant-key", tenant)
            .header("Secret", tenant_secret(tenant, &self.salt))
            .json(notification)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(tenant, key = %notification.response_key, "Notification delivered");
            }
            Ok(response) => {
                warn!(
                    tenant,
                    status = %response.status(),
                    "Notification endpoint rejected the payload"
                );
            }
            Err(e) => {
                warn!(tenant, "Failed to deliver notification: {e}");
            }
        }
    }
}

/// Per-tenant shared secret: hex-encoded SHA-256 of the tenant key
/// concatenated with the configured salt.
fn tenant_secret(tenant: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}
