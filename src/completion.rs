use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::retry::{with_retry, RetryConfig};

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// What to translate and where to. Language fields carry display names
/// ("French"), not culture codes, so the prompt reads naturally.
#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    pub source_text: String,
    pub source_language: String,
    pub target_language: String,
    pub context: Option<String>,
}

/// Chat-completion client that proposes a translation for one resource.
pub struct TranslationCompleter {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    pub(crate) retry: RetryConfig,
}

impl TranslationCompleter {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.completion_api_url.clone(),
            api_key: config.completion_api_key.clone(),
            model: config.completion_model.clone(),
            temperature: config.completion_temperature,
            retry: RetryConfig::completion(config.completion_retry_delay),
        }
    }

    /// Ask for a translation. Exhausted retries degrade to `None` so the
    /// caller leaves the culture unfilled instead of failing the batch.
    pub async fn suggest(&self, req: &SuggestionRequest) -> Option<String> {
        let result = with_retry(&self.retry, "translation completion", || {
            self.request_once(req)
        })
        .await;

        match result {
            Ok(content) => Some(post_process(&content)),
            Err(e) => {
                warn!(
                    source = %req.source_language,
                    target = %req.target_language,
                    "Completion unavailable, leaving resource unfilled: {e:#}"
                );
                None
            }
        }
    }

    async fn request_once(&self, req: &SuggestionRequest) -> Result<String> {
        let system_prompt = format!(
            "You are a professional software localization translator. \
             Translate user interface text from {} to {}. \
             Reply with the translated text only: no quotes, no labels, \
             no explanations. Preserve placeholders such as {{0}} or \
             {{name}} exactly as they appear.",
            req.source_language, req.target_language
        );

        let user_prompt = match &req.context {
            Some(context) if !context.is_empty() => format!(
                "Context: {}\n\nTranslate: {}",
                context, req.source_text
            ),
            _ => format!("Translate: {}", req.source_text),
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt,
                },
                Message {
                    role: "user".to_string(),
                    content: user_prompt,
                },
            ],
            max_tokens: 1000,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion API error ({}): {}", status, body);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();

        // An empty reply is retried like a transport failure.
        if content.is_empty() {
            anyhow::bail!("Completion returned empty content");
        }

        Ok(content)
    }
}

/// Normalize a raw completion reply. Some models wrap the answer in quotes
/// or prefix it with a label ("Translation: ..."); keep only the text
/// after the first colon and strip quote characters, single quotes
/// included.
fn post_process(raw: &str) -> String {
    let without_quotes: String = raw
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '\u{201c}' | '\u{201d}'))
        .collect();
    let after_label = match without_quotes.split_once(':') {
        Some((_, suffix)) => suffix,
        None => without_quotes.as_str(),
    };
    after_label.trim().to_string()
}
