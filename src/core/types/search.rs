//! Search strategy, result, and synthesis types.

use super::errors::SearchError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How far a search round should dig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Shallow,
    #[default]
    Medium,
    Deep,
}

impl SearchDepth {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "shallow" => Self::Shallow,
            "deep" => Self::Deep,
            _ => Self::Medium,
        }
    }
}

/// Output of the planning stage: what to search for and why.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchStrategy {
    pub primary_keywords: Vec<String>,
    pub secondary_keywords: Vec<String>,
    /// Core intent behind the query
    pub intent: String,
    /// Dominant domain (technology, business, academic, ...)
    pub domain: String,
    /// Kinds of information wanted (definitions, tutorials, statistics, ...)
    pub info_types: Vec<String>,
    pub depth: SearchDepth,
}

/// One retrieved document. The URL is the deduplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
    /// Backend-reported relevance in [0, 1]
    #[serde(default)]
    pub relevance: f32,
}

impl SearchResult {
    pub fn new(
        title: impl Into<String>,
        snippet: impl Into<String>,
        url: impl Into<String>,
        relevance: f32,
    ) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            url: url.into(),
            relevance,
        }
    }
}

/// Uniform search response. Terminal failures are reported in-band,
/// never as an error crossing the search client's boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub latency: Duration,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SearchError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl SearchResponse {
    pub fn ok(query: impl Into<String>, results: Vec<SearchResult>, latency: Duration) -> Self {
        Self {
            query: query.into(),
            results,
            latency,
            success: true,
            error: None,
            metadata: None,
        }
    }

    pub fn failure(query: impl Into<String>, error: SearchError, latency: Duration) -> Self {
        Self {
            query: query.into(),
            results: Vec::new(),
            latency,
            success: false,
            error: Some(error),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// How well the synthesized seed is backed by evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    PartiallyVerified,
    NeedsVerification,
    InsufficientData,
}

impl VerificationStatus {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "verified" => Self::Verified,
            "partially_verified" => Self::PartiallyVerified,
            "insufficient_data" => Self::InsufficientData,
            _ => Self::NeedsVerification,
        }
    }
}

/// Output of the synthesis stage: the contextual seed plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    /// The contextual thinking seed (roughly 200-400 characters)
    pub contextual_seed: String,
    /// Source URLs backing the seed
    pub sources: Vec<String>,
    /// Confidence in [0, 1]
    pub confidence: f32,
    pub key_insights: Vec<String>,
    pub knowledge_gaps: Vec<String>,
    pub verification_status: VerificationStatus,
}
