//! Thinking-seed contexts exchanged between the RAG pipeline and the
//! seed verifier.

use super::search::SearchResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stage-one output consumed by the verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingSeedContext {
    pub user_query: String,
    pub thinking_seed: String,
    #[serde(default)]
    pub generation_metadata: serde_json::Map<String, serde_json::Value>,
}

impl ThinkingSeedContext {
    pub fn new(user_query: impl Into<String>, thinking_seed: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            thinking_seed: thinking_seed.into(),
            generation_metadata: serde_json::Map::new(),
        }
    }
}

/// Verification-search priority. High dimensions are searched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    /// Sort key: high > medium > low.
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }
}

/// A named angle from which to retrieve verification evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDimension {
    pub name: String,
    pub query: String,
    pub priority: Priority,
    pub reason: String,
}

/// A persisted evidence source, optionally tagged with the dimension
/// that surfaced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub snippet: String,
    pub url: String,
    #[serde(default)]
    pub relevance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
}

impl SourceRef {
    pub fn from_result(result: &SearchResult, dimension: Option<String>) -> Self {
        Self {
            title: result.title.clone(),
            snippet: result.snippet.clone(),
            url: result.url.clone(),
            relevance: result.relevance,
            dimension,
        }
    }
}

/// Mutable record accumulated along the verification pipeline.
///
/// Created at verification entry, mutated by each step, emitted on
/// completion. `verification_passed` is always true on a completed run
/// so downstream planning is never blocked; consumers that want a hard
/// gate threshold `feasibility_score` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedVerificationContext {
    pub user_query: String,
    pub original_seed: String,
    pub verification_passed: bool,
    /// Feasibility in [0, 1]
    pub feasibility_score: f32,
    /// Tag describing how the score was produced
    pub verification_method: String,
    pub evidence: Vec<String>,
    pub search_dimensions: Vec<SearchDimension>,
    pub verification_sources: Vec<SourceRef>,
    /// Search results grouped by dimension name
    pub multidim_results: HashMap<String, Vec<SearchResult>>,
    pub enhanced_seed: String,
    pub metrics: HashMap<String, f64>,
    pub errors: Vec<String>,
}

impl SeedVerificationContext {
    pub fn new(user_query: impl Into<String>, original_seed: impl Into<String>) -> Self {
        let original_seed = original_seed.into();
        Self {
            user_query: user_query.into(),
            enhanced_seed: original_seed.clone(),
            original_seed,
            verification_passed: true,
            feasibility_score: 0.0,
            verification_method: String::new(),
            evidence: Vec::new(),
            search_dimensions: Vec::new(),
            verification_sources: Vec::new(),
            multidim_results: HashMap::new(),
            metrics: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn add_metric(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.insert(name.into(), value);
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// True when enhancement replaced the original seed.
    pub fn was_enhanced(&self) -> bool {
        self.enhanced_seed != self.original_seed
    }
}

/// Outcome of a single idea-feasibility verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaVerificationReport {
    pub idea_text: String,
    /// Feasibility in [0, 1]
    pub feasibility_score: f32,
    pub analysis_summary: String,
    pub search_results: Vec<SearchResult>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
