//! Provider adapters: a uniform `ChatCompletion` capability over
//! heterogeneous vendor APIs.
//!
//! Adapters are stateless beyond their HTTP client and perform exactly
//! one attempt per call; retry and fallback policy live in the router.

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

use crate::config::{ProviderKind, ProviderSettings};
use crate::core::types::{ChatMessage, ChatResponse, CompletionOptions, ErrorKind, ProviderError};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatProvider;

/// A finite lazy sequence of text chunks from a streaming completion.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Uniform chat-completion capability.
///
/// One implementation per vendor wire shape. Implementations map the
/// uniform message sequence onto the vendor request, apply per-call
/// overrides on top of their configuration, impose the configured
/// connect/read timeouts, and classify every failure into [`ErrorKind`].
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Unique provider name used for routing and logging.
    fn name(&self) -> &str;

    /// Single completion attempt. Never retries.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &CompletionOptions,
    ) -> Result<ChatResponse, ProviderError>;

    /// Whether `chat_stream` yields real chunks.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Streaming completion attempt.
    async fn chat_stream(
        &self,
        _messages: &[ChatMessage],
        _opts: &CompletionOptions,
    ) -> Result<ChunkStream, ProviderError> {
        Err(ProviderError::unknown(
            self.name(),
            "streaming is not supported by this provider",
        ))
    }

    /// Cheap reachability/credential probe (list-models or version
    /// endpoint). Used at registration and by health checks.
    async fn validate_config(&self) -> bool;

    /// Models this provider reports as available.
    async fn available_models(&self) -> Vec<String>;
}

/// Instantiate the adapter matching a vendor kind.
pub fn build_provider(
    name: &str,
    settings: &ProviderSettings,
    api_key: Option<String>,
) -> Result<Arc<dyn ChatCompletion>, ProviderError> {
    match settings.kind {
        ProviderKind::OpenAi | ProviderKind::DeepSeek | ProviderKind::Azure => Ok(Arc::new(
            OpenAiCompatProvider::new(name, settings.clone(), api_key)?,
        )),
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicProvider::new(
            name,
            settings.clone(),
            api_key,
        )?)),
        ProviderKind::Gemini => Ok(Arc::new(GeminiProvider::new(
            name,
            settings.clone(),
            api_key,
        )?)),
        ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::new(name, settings.clone())?)),
    }
}

/// Build a reqwest client with the configured connect/read timeout pair.
pub(crate) fn build_http_client(
    provider: &str,
    settings: &ProviderSettings,
) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .timeout(Duration::from_secs(settings.read_timeout_secs))
        .build()
        .map_err(|e| ProviderError::network(provider, format!("failed to build HTTP client: {e}")))
}

/// Classify a non-success HTTP response into the error taxonomy.
///
/// Status code takes precedence; the body is consulted for credential
/// and rate-limit phrasing that some vendors bury under other codes.
pub(crate) fn classify_http_error(
    provider: &str,
    status: u16,
    body: &str,
    retry_after_header: Option<u64>,
) -> ProviderError {
    let body_lower = body.to_lowercase();

    if status == 401 || status == 403 || body_lower.contains("api key") {
        return ProviderError::auth(provider, summarize_body(status, body));
    }
    if status == 429
        || body_lower.contains("rate limit")
        || body_lower.contains("retry after")
        || (body_lower.contains("rate") && body_lower.contains("limit"))
    {
        let hint = retry_after_header.or_else(|| extract_retry_after_hint(&body_lower));
        return ProviderError::rate_limit(provider, hint);
    }
    match status {
        400 => ProviderError::invalid_request(provider, summarize_body(status, body)),
        404 if body_lower.contains("model") => ProviderError::new(
            provider,
            ErrorKind::ModelNotFound,
            summarize_body(status, body),
        ),
        500..=599 => ProviderError::server(provider, summarize_body(status, body)),
        _ => ProviderError::unknown(provider, summarize_body(status, body)),
    }
}

/// Pull a `Retry-After` value out of response headers.
pub(crate) fn retry_after_from_headers(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Extract a suggested wait from common body phrasings
/// ("retry after 30s", "wait 10 seconds", ...).
fn extract_retry_after_hint(body_lower: &str) -> Option<u64> {
    static PATTERNS: once_cell::sync::Lazy<Vec<regex::Regex>> = once_cell::sync::Lazy::new(|| {
        [
            r"retry after (\d+)\s*s",
            r"retry[- ]after[:\s]+(\d+)",
            r"wait (\d+) seconds",
        ]
        .iter()
        .filter_map(|p| regex::Regex::new(p).ok())
        .collect()
    });
    for pattern in PATTERNS.iter() {
        if let Some(caps) = pattern.captures(body_lower) {
            if let Some(value) = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok()) {
                return Some(value);
            }
        }
    }
    None
}

fn summarize_body(status: u16, body: &str) -> String {
    let trimmed = crate::utils::truncate_chars(body.trim(), 300);
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {trimmed}")
    }
}
