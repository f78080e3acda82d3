//! Ollama local-runtime adapter.
//!
//! No credential; `/api/tags` doubles as the reachability probe and the
//! model listing.

use super::{ChatCompletion, build_http_client, classify_http_error, retry_after_from_headers};
use crate::config::ProviderSettings;
use crate::core::types::{ChatMessage, ChatResponse, CompletionOptions, ProviderError, Usage};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::debug;

/// Adapter for `POST /api/chat` against a local Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    name: String,
    settings: ProviderSettings,
    http: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(name: &str, settings: ProviderSettings) -> Result<Self, ProviderError> {
        let http = build_http_client(name, &settings)?;
        Ok(Self {
            name: name.to_string(),
            settings,
            http,
        })
    }
}

#[async_trait]
impl ChatCompletion for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &CompletionOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let url = format!("{}/api/chat", self.settings.resolved_base_url());
        let body = json!({
            "model": self.settings.resolved_model(),
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": opts.temperature.unwrap_or(self.settings.temperature),
                "num_predict": opts.max_tokens.unwrap_or(self.settings.max_tokens),
            },
        });

        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, e))?;

        let status = response.status().as_u16();
        let retry_after = retry_after_from_headers(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, e))?;
        if !(200..300).contains(&status) {
            return Err(classify_http_error(&self.name, status, &text, retry_after));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::parse(&self.name, format!("invalid JSON body: {e}")))?;

        let content = value["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let mut chat = ChatResponse::ok(
            content,
            &self.name,
            self.settings.resolved_model(),
            start.elapsed(),
        );
        if value["done"].as_bool() == Some(true) {
            chat = chat.with_finish_reason("stop");
        }
        if let Some(prompt) = value["prompt_eval_count"].as_u64() {
            let completion = value["eval_count"].as_u64().unwrap_or(0);
            chat = chat.with_usage(Usage {
                prompt_tokens: prompt as u32,
                completion_tokens: completion as u32,
                total_tokens: (prompt + completion) as u32,
            });
        }
        Ok(chat)
    }

    async fn validate_config(&self) -> bool {
        let url = format!("{}/api/tags", self.settings.resolved_base_url());
        match self.http.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(provider = %self.name, "daemon probe failed: {e}");
                false
            }
        }
    }

    async fn available_models(&self) -> Vec<String> {
        let url = format!("{}/api/tags", self.settings.resolved_base_url());
        let Ok(response) = self.http.get(url).send().await else {
            return Vec::new();
        };
        let Ok(value) = response.json::<Value>().await else {
            return Vec::new();
        };
        value["models"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
