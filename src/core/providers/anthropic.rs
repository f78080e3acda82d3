//! Anthropic Messages API adapter.

use super::{ChatCompletion, build_http_client, classify_http_error, retry_after_from_headers};
use crate::config::ProviderSettings;
use crate::core::types::{
    ChatMessage, ChatResponse, CompletionOptions, ProviderError, Role, Usage,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::debug;

const API_VERSION: &str = "2023-06-01";

/// Adapter for `POST /v1/messages`.
///
/// System messages ride in the dedicated `system` field; the messages
/// array carries only user/assistant turns.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    name: String,
    settings: ProviderSettings,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(
        name: &str,
        settings: ProviderSettings,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let http = build_http_client(name, &settings)?;
        Ok(Self {
            name: name.to_string(),
            settings,
            api_key,
            http,
        })
    }

    fn build_body(&self, messages: &[ChatMessage], opts: &CompletionOptions) -> Value {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut turns: Vec<Value> = Vec::new();
        for message in messages {
            match message.role {
                Role::System => system_parts.push(&message.content),
                Role::User => turns.push(json!({"role": "user", "content": message.content})),
                Role::Assistant => {
                    turns.push(json!({"role": "assistant", "content": message.content}));
                }
            }
        }

        let mut body = json!({
            "model": self.settings.resolved_model(),
            "max_tokens": opts.max_tokens.unwrap_or(self.settings.max_tokens),
            "messages": turns,
            "temperature": opts.temperature.unwrap_or(self.settings.temperature),
        });
        if !system_parts.is_empty() {
            body["system"] = json!(system_parts.join("\n"));
        }
        body
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.settings.resolved_base_url());
        let mut req = self
            .http
            .request(method, url)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }
        req
    }
}

#[async_trait]
impl ChatCompletion for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &CompletionOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let body = self.build_body(messages, opts);

        let response = self
            .request(reqwest::Method::POST, "/v1/messages")
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

        let content = value["content"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let mut chat = ChatResponse::ok(
            content,
            &self.name,
            self.settings.resolved_model(),
            start.elapsed(),
        );
        if let Some(reason) = value["stop_reason"].as_str() {
            chat = chat.with_finish_reason(reason);
        }
        if let (Some(input), Some(output)) = (
            value["usage"]["input_tokens"].as_u64(),
            value["usage"]["output_tokens"].as_u64(),
        ) {
            chat = chat.with_usage(Usage {
                prompt_tokens: input as u32,
                completion_tokens: output as u32,
                total_tokens: (input + output) as u32,
            });
        }
        Ok(chat)
    }

    async fn validate_config(&self) -> bool {
        match self
            .request(reqwest::Method::GET, "/v1/models")
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(provider = %self.name, "config probe failed: {e}");
                false
            }
        }
    }

    async fn available_models(&self) -> Vec<String> {
        let Ok(response) = self
            .request(reqwest::Method::GET, "/v1/models")
            .send()
            .await
        else {
            return Vec::new();
        };
        let Ok(value) = response.json::<Value>().await else {
            return Vec::new();
        };
        value["data"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
