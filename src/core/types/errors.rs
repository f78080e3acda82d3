//! Error taxonomy shared by every external call.
//!
//! All provider and search failures are classified into the closed
//! [`ErrorKind`] set; the kind drives retry and fallback policy.

use serde::{Deserialize, Serialize};

/// Classification of an external-call failure.
///
/// The router and search client branch on this, never on error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Socket, DNS, or TLS failure
    Network,
    /// Deadline exceeded
    Timeout,
    /// Invalid or missing credential (HTTP 401/403)
    Auth,
    /// HTTP 429 or a rate/quota message in the body
    RateLimit,
    /// HTTP 400
    InvalidRequest,
    /// HTTP 404 pointing at a model
    ModelNotFound,
    /// HTTP 5xx
    Server,
    /// Malformed response body
    Parse,
    /// Everything else
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::InvalidRequest => "invalid_request",
            Self::ModelNotFound => "model_not_found",
            Self::Server => "server",
            Self::Parse => "parse",
            Self::Unknown => "unknown",
        }
    }

    /// Transient failures worth retrying against the same backend.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::Server | Self::Unknown
        )
    }

    /// Failures a deterministic mock response may stand in for.
    ///
    /// Auth failures are excluded: they need operator action and must
    /// surface.
    pub fn is_mock_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::Server | Self::Unknown
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from a single chat-completion attempt.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} error from {provider}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ErrorKind,
    pub message: String,
    /// Backend-suggested wait, seconds. Only populated for rate limits.
    pub retry_after: Option<u64>,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Network, message)
    }

    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Timeout, message)
    }

    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Auth, message)
    }

    pub fn rate_limit(provider: impl Into<String>, retry_after: Option<u64>) -> Self {
        let message = match retry_after {
            Some(secs) => format!("rate limit exceeded, retry after {secs}s"),
            None => "rate limit exceeded".to_string(),
        };
        Self {
            provider: provider.into(),
            kind: ErrorKind::RateLimit,
            message,
            retry_after,
        }
    }

    pub fn invalid_request(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::InvalidRequest, message)
    }

    pub fn model_not_found(provider: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            provider,
            ErrorKind::ModelNotFound,
            format!("model '{model}' not found"),
        )
    }

    pub fn server(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Server, message)
    }

    pub fn parse(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Parse, message)
    }

    pub fn unknown(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Unknown, message)
    }

    /// Map a transport-level failure onto the taxonomy.
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(provider, err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::network(provider, err.to_string())
        } else if err.is_decode() {
            Self::parse(provider, err.to_string())
        } else {
            Self::unknown(provider, err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse("unknown", err.to_string())
    }
}

/// A classified failure from a search backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind} search error: {message}")]
pub struct SearchError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl SearchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, secs: Option<u64>) -> Self {
        self.retry_after = secs;
        self
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorKind::Timeout, err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::new(ErrorKind::Network, err.to_string())
        } else if err.is_decode() {
            Self::new(ErrorKind::Parse, err.to_string())
        } else {
            Self::new(ErrorKind::Unknown, err.to_string())
        }
    }
}

/// Errors surfaced by the router's throwing convenience wrappers.
///
/// The primary `complete` operation never returns these; it reports
/// failure inside the `ChatResponse` payload.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no providers available")]
    NoProviders,

    #[error("completion failed: {0}")]
    Completion(String),

    #[error("provider '{provider}' does not support streaming")]
    StreamingNotSupported { provider: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(!ErrorKind::Auth.is_retryable());
        assert!(!ErrorKind::InvalidRequest.is_retryable());
    }

    #[test]
    fn auth_is_never_mock_recoverable() {
        assert!(!ErrorKind::Auth.is_mock_recoverable());
        assert!(ErrorKind::Timeout.is_mock_recoverable());
    }

    #[test]
    fn rate_limit_carries_hint() {
        let err = ProviderError::rate_limit("openai", Some(30));
        assert_eq!(err.kind, ErrorKind::RateLimit);
        assert_eq!(err.retry_after, Some(30));
        assert!(err.message.contains("30"));
    }
}
