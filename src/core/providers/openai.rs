//! OpenAI-compatible chat adapter.
//!
//! Serves every vendor speaking the OpenAI wire shape: OpenAI itself,
//! DeepSeek, and Azure OpenAI deployments. This is also the only adapter
//! with SSE streaming support.

use super::{
    ChatCompletion, ChunkStream, build_http_client, classify_http_error, retry_after_from_headers,
};
use crate::config::ProviderSettings;
use crate::core::types::{ChatMessage, ChatResponse, CompletionOptions, ProviderError, Usage};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::debug;

/// Adapter for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    name: String,
    settings: ProviderSettings,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl OpenAiCompatProvider {
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

    fn build_body(
        &self,
        messages: &[ChatMessage],
        opts: &CompletionOptions,
        stream: bool,
    ) -> Value {
        json!({
            "model": self.settings.resolved_model(),
            "messages": messages,
            "temperature": opts.temperature.unwrap_or(self.settings.temperature),
            "max_tokens": opts.max_tokens.unwrap_or(self.settings.max_tokens),
            "stream": stream,
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.settings.resolved_base_url());
        let mut req = self.http.post(url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn send(&self, body: Value) -> Result<Value, ProviderError> {
        let response = self
            .request("/chat/completions")
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
        serde_json::from_str(&text)
            .map_err(|e| ProviderError::parse(&self.name, format!("invalid JSON body: {e}")))
    }

    fn parse_response(&self, value: Value, latency: std::time::Duration) -> ChatResponse {
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let mut response =
            ChatResponse::ok(content, &self.name, self.settings.resolved_model(), latency);
        if let Some(reason) = value["choices"][0]["finish_reason"].as_str() {
            response = response.with_finish_reason(reason);
        }
        if let Some(usage) = parse_usage(&value["usage"]) {
            response = response.with_usage(usage);
        }
        response
    }
}

fn parse_usage(value: &Value) -> Option<Usage> {
    let prompt = value.get("prompt_tokens")?.as_u64()? as u32;
    let completion = value
        .get("completion_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let total = value
        .get("total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or((prompt + completion) as u64) as u32;
    Some(Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
    })
}

#[async_trait]
impl ChatCompletion for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &CompletionOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let body = self.build_body(messages, opts, false);
        let value = self.send(body).await?;
        Ok(self.parse_response(value, start.elapsed()))
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        opts: &CompletionOptions,
    ) -> Result<ChunkStream, ProviderError> {
        let body = self.build_body(messages, opts, true);
        let response = self
            .request("/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, e))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let retry_after = retry_after_from_headers(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(&self.name, status, &text, retry_after));
        }

        let provider = self.name.clone();
        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            let mut buffer = String::new();
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| ProviderError::from_reqwest(&provider, e))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        break 'read;
                    }
                    if data.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(data) {
                        Ok(event) => {
                            if let Some(delta) = event["choices"][0]["delta"]["content"].as_str() {
                                if !delta.is_empty() {
                                    yield delta.to_string();
                                }
                            }
                        }
                        Err(e) => debug!(provider = %provider, "skipping malformed SSE event: {e}"),
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn validate_config(&self) -> bool {
        let url = format!("{}/models", self.settings.resolved_base_url());
        let mut req = self.http.get(url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        match req.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(provider = %self.name, "config probe failed: {e}");
                false
            }
        }
    }

    async fn available_models(&self) -> Vec<String> {
        let url = format!("{}/models", self.settings.resolved_base_url());
        let mut req = self.http.get(url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let Ok(response) = req.send().await else {
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
