//! Chat request and response types.

use super::errors::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role
    pub role: Role,
    /// Message content
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call overrides applied on top of provider configuration.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Route to a specific provider when it is healthy
    pub provider: Option<String>,
    /// Sampling temperature override
    pub temperature: Option<f32>,
    /// Max completion tokens override
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token accounting as reported by the vendor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Error payload carried inside a failed [`ChatResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Uniform completion response.
///
/// When `success` is false, `content` is empty and `error` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    pub content: String,
    pub provider: String,
    pub model: String,
    pub latency: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ChatError>,
}

impl ChatResponse {
    /// Successful response with content.
    pub fn ok(
        content: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            success: true,
            content: content.into(),
            provider: provider.into(),
            model: model.into(),
            latency,
            usage: None,
            finish_reason: None,
            error: None,
        }
    }

    /// Failed response carrying the classified error.
    pub fn failure(
        provider: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            content: String::new(),
            provider: provider.into(),
            model: String::new(),
            latency: Duration::ZERO,
            usage: None,
            finish_reason: None,
            error: Some(ChatError {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    /// Kind of the carried error, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
