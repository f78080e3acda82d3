//! Search backends: the Tavily HTTP backend and the deterministic mock.

use crate::core::providers::classify_http_error;
use crate::core::types::{SearchError, SearchResult};
use crate::utils::truncate_chars;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Results plus backend-specific metadata (e.g. Tavily's AI answer).
#[derive(Debug, Clone, Default)]
pub struct BackendOutput {
    pub results: Vec<SearchResult>,
    pub metadata: Option<Value>,
}

/// A concrete search engine. One attempt per call; retry policy lives
/// in [`super::WebSearchClient`].
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize)
    -> Result<BackendOutput, SearchError>;
}

/// Tavily AI-search backend.
pub struct TavilyBackend {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl TavilyBackend {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()
            .map_err(SearchError::from_reqwest)?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: TAVILY_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchBackend for TavilyBackend {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<BackendOutput, SearchError> {
        let body = json!({
            "query": query,
            "max_results": max_results,
            "search_depth": "advanced",
            "include_answer": true,
            "include_raw_content": false,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(SearchError::from_reqwest)?;

        let status = response.status().as_u16();
        let retry_after = crate::core::providers::retry_after_from_headers(response.headers());
        let text = response.text().await.map_err(SearchError::from_reqwest)?;
        if !(200..300).contains(&status) {
            let err = classify_http_error("tavily", status, &text, retry_after);
            return Err(SearchError::new(err.kind, err.message).with_retry_after(err.retry_after));
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            SearchError::new(
                crate::core::types::ErrorKind::Parse,
                format!("invalid JSON body: {e}"),
            )
        })?;

        let results = value["results"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .take(max_results)
                    .map(|item| SearchResult {
                        title: item["title"].as_str().unwrap_or_default().to_string(),
                        snippet: truncate_chars(item["content"].as_str().unwrap_or_default(), 500)
                            .to_string(),
                        url: item["url"].as_str().unwrap_or_default().to_string(),
                        relevance: item["score"].as_f64().unwrap_or(0.8) as f32,
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        debug!(count = results.len(), "tavily search returned");

        let metadata = json!({
            "search_engine": "tavily",
            "answer": value["answer"].as_str().unwrap_or_default(),
            "search_depth": "advanced",
        });
        Ok(BackendOutput {
            results,
            metadata: Some(metadata),
        })
    }
}

/// Deterministic stub backend.
///
/// Generates plausible results from the query text alone, so pipelines
/// stay demonstrable when no search credential is configured.
#[derive(Debug, Default, Clone)]
pub struct MockBackend;

impl MockBackend {
    fn slug(query: &str) -> String {
        let slug: String = query
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        let slug = slug.trim_matches('-').to_string();
        let trimmed = truncate_chars(&slug, 32).trim_matches('-').to_string();
        if trimmed.is_empty() {
            "query".to_string()
        } else {
            trimmed
        }
    }
}

#[async_trait]
impl SearchBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<BackendOutput, SearchError> {
        let topic = truncate_chars(query, 40);
        let slug = Self::slug(query);

        let mut results = vec![
            SearchResult::new(
                format!("Comprehensive analysis of '{topic}'"),
                format!(
                    "A detailed analysis of {topic} covering the problem space, \
                     current approaches, and trade-offs from several angles."
                ),
                format!("https://example.com/{slug}/analysis"),
                0.8,
            ),
            SearchResult::new(
                format!("{topic} - implementation guide"),
                format!(
                    "Step-by-step guidance and established practices for {topic}, \
                     aimed at getting productive quickly."
                ),
                format!("https://example.com/{slug}/guide"),
                0.7,
            ),
            SearchResult::new(
                format!("{topic} - case studies"),
                format!(
                    "Real-world case studies showing how {topic} plays out in \
                     practice, with outcomes to use as reference points."
                ),
                format!("https://example.com/{slug}/case-study"),
                0.6,
            ),
        ];
        results.truncate(max_results);

        Ok(BackendOutput {
            results,
            metadata: Some(json!({"search_engine": "mock"})),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_results_are_deterministic_and_distinct_per_query() {
        let backend = MockBackend;
        let first = backend.search("rust async runtimes", 8).await.unwrap();
        let again = backend.search("rust async runtimes", 8).await.unwrap();
        assert_eq!(first.results, again.results);

        let other = backend.search("postgres tuning", 8).await.unwrap();
        assert_ne!(first.results[0].url, other.results[0].url);
    }

    #[tokio::test]
    async fn mock_respects_max_results() {
        let backend = MockBackend;
        let output = backend.search("anything", 2).await.unwrap();
        assert_eq!(output.results.len(), 2);
    }

    #[test]
    fn slug_handles_non_ascii_queries() {
        assert_eq!(MockBackend::slug("最新技术"), "query");
        assert_eq!(MockBackend::slug("Rust 2025 trends"), "rust-2025-trends");
    }
}
