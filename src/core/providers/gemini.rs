//! Google Gemini `generateContent` adapter.

use super::{ChatCompletion, build_http_client, classify_http_error, retry_after_from_headers};
use crate::config::ProviderSettings;
use crate::core::types::{
    ChatMessage, ChatResponse, CompletionOptions, ProviderError, Role, Usage,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::debug;

/// Adapter for `POST /v1beta/models/{model}:generateContent`.
///
/// The credential travels as a `key` query parameter; assistant turns map
/// to the `model` role and system messages to `systemInstruction`.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    name: String,
    settings: ProviderSettings,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl GeminiProvider {
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

    fn key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    fn build_body(&self, messages: &[ChatMessage], opts: &CompletionOptions) -> Value {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();
        for message in messages {
            match message.role {
                Role::System => system_parts.push(&message.content),
                Role::User => contents.push(json!({
                    "role": "user",
                    "parts": [{"text": message.content}],
                })),
                Role::Assistant => contents.push(json!({
                    "role": "model",
                    "parts": [{"text": message.content}],
                })),
            }
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": opts.temperature.unwrap_or(self.settings.temperature),
                "maxOutputTokens": opts.max_tokens.unwrap_or(self.settings.max_tokens),
            },
        });
        if !system_parts.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system_parts.join("\n")}]});
        }
        body
    }
}

#[async_trait]
impl ChatCompletion for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &CompletionOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let model = self.settings.resolved_model();
        let url = format!(
            "{}/v1beta/models/{model}:generateContent?key={}",
            self.settings.resolved_base_url(),
            self.key(),
        );

        let response = self
            .http
            .post(url)
            .json(&self.build_body(messages, opts))
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

        let content = value["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let mut chat = ChatResponse::ok(content, &self.name, model, start.elapsed());
        if let Some(reason) = value["candidates"][0]["finishReason"].as_str() {
            chat = chat.with_finish_reason(reason);
        }
        let meta = &value["usageMetadata"];
        if let Some(prompt) = meta["promptTokenCount"].as_u64() {
            let completion = meta["candidatesTokenCount"].as_u64().unwrap_or(0);
            let total = meta["totalTokenCount"].as_u64().unwrap_or(prompt + completion);
            chat = chat.with_usage(Usage {
                prompt_tokens: prompt as u32,
                completion_tokens: completion as u32,
                total_tokens: total as u32,
            });
        }
        Ok(chat)
    }

    async fn validate_config(&self) -> bool {
        let url = format!(
            "{}/v1beta/models?key={}",
            self.settings.resolved_base_url(),
            self.key(),
        );
        match self.http.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(provider = %self.name, "config probe failed: {e}");
                false
            }
        }
    }

    async fn available_models(&self) -> Vec<String> {
        let url = format!(
            "{}/v1beta/models?key={}",
            self.settings.resolved_base_url(),
            self.key(),
        );
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
