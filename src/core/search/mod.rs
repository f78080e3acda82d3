//! Search capability: rate-limited, retrying search client with a
//! deterministic mock fallback.

mod backends;
mod ranking;
mod rate_limiter;

pub use backends::{BackendOutput, MockBackend, SearchBackend, TavilyBackend};
pub use ranking::{dedup_by_url, keyword_score, rank_and_trim};
pub use rate_limiter::SearchRateLimiter;

use crate::config::RagConfig;
use crate::core::types::{ErrorKind, SearchError, SearchResponse};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cumulative search statistics.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub total_searches: u64,
    pub successful_searches: u64,
    pub total_search_time: f64,
    pub avg_search_time: f64,
}

/// Rate-limited search client over a pluggable backend.
///
/// Behavior guaranteed to callers:
/// - a process-wide minimum interval between outbound requests;
/// - transient failures retried with exponential backoff (capped 30 s,
///   60 s for rate limits; a backend `retry-after` hint is preferred up
///   to 120 s);
/// - recoverable terminal failures degrade to the deterministic mock;
///   auth failures surface instead (they need operator action);
/// - terminal failures are returned as data, never raised.
pub struct WebSearchClient {
    backend: Arc<dyn SearchBackend>,
    mock: MockBackend,
    limiter: Arc<SearchRateLimiter>,
    cfg: RagConfig,
    stats: Mutex<SearchStats>,
}

impl WebSearchClient {
    /// Build from configuration. Uses the Tavily backend when real
    /// search is enabled and a credential resolves; otherwise every
    /// query is served by the mock.
    pub fn new(cfg: RagConfig) -> Self {
        let limiter =
            SearchRateLimiter::global(Duration::from_secs_f64(cfg.search_rate_limit_interval));
        let backend: Arc<dyn SearchBackend> = if cfg.enable_real_web_search {
            match std::env::var(&cfg.search_api_key_env) {
                Ok(key) if !key.is_empty() => match TavilyBackend::new(key) {
                    Ok(backend) => Arc::new(backend),
                    Err(e) => {
                        warn!("tavily backend unavailable ({e}), using mock search");
                        Arc::new(MockBackend)
                    }
                },
                _ => {
                    warn!(
                        env = %cfg.search_api_key_env,
                        "no search credential, using mock search"
                    );
                    Arc::new(MockBackend)
                }
            }
        } else {
            Arc::new(MockBackend)
        };
        Self::with_backend(cfg, backend, limiter)
    }

    /// Dependency-injection constructor with an explicit backend and
    /// limiter.
    pub fn with_backend(
        cfg: RagConfig,
        backend: Arc<dyn SearchBackend>,
        limiter: Arc<SearchRateLimiter>,
    ) -> Self {
        Self {
            backend,
            mock: MockBackend,
            limiter,
            cfg,
            stats: Mutex::new(SearchStats::default()),
        }
    }

    /// Execute a search. Never returns an error: terminal failures are
    /// carried inside the response.
    pub async fn search(&self, query: &str, max_results: Option<usize>) -> SearchResponse {
        let start = Instant::now();
        let max_results = max_results.unwrap_or(self.cfg.max_search_results);
        debug!(query = %query, max_results, backend = self.backend.name(), "search start");

        if !self.cfg.enable_real_web_search {
            let response = self.mock_response(query, max_results, None).await;
            self.record(start, response.success);
            return response;
        }

        let attempts = self.cfg.search_max_retries.max(1);
        let mut last_error: Option<SearchError> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt, last_error.as_ref());
                info!(attempt, delay_secs = delay.as_secs_f64(), "search retry");
                tokio::time::sleep(delay).await;
            }
            self.limiter.acquire().await;

            match self.backend.search(query, max_results).await {
                Ok(output) => {
                    let mut response =
                        SearchResponse::ok(query, output.results, start.elapsed());
                    if let Some(metadata) = output.metadata {
                        response = response.with_metadata(metadata);
                    }
                    self.record(start, true);
                    return response;
                }
                Err(err) => {
                    warn!(kind = %err.kind, attempt, "search attempt failed: {}", err.message);
                    if err.kind == ErrorKind::Auth {
                        // Auth needs operator action; surfacing beats masking.
                        self.record(start, false);
                        return SearchResponse::failure(query, err, start.elapsed());
                    }
                    let retryable = err.kind.is_retryable();
                    last_error = Some(err);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let err = last_error
            .unwrap_or_else(|| SearchError::new(ErrorKind::Unknown, "search failed"));
        if err.kind.is_mock_recoverable() {
            info!(kind = %err.kind, "search unavailable, using fallback analysis");
            let response = self.mock_response(query, max_results, Some(&err)).await;
            self.record(start, response.success);
            return response;
        }
        self.record(start, false);
        SearchResponse::failure(query, err, start.elapsed())
    }

    fn backoff_delay(&self, attempt: u32, last_error: Option<&SearchError>) -> Duration {
        let base = self.cfg.search_retry_base_delay;
        let rate_limited = last_error.map(|e| e.kind == ErrorKind::RateLimit).unwrap_or(false);
        let mut delay = if rate_limited {
            (base * 3f64.powi(attempt as i32)).min(60.0)
        } else {
            (base * 2f64.powi(attempt as i32)).min(30.0)
        };
        if let Some(hint) = last_error.and_then(|e| e.retry_after) {
            if hint <= 120 {
                delay = hint as f64;
            }
        }
        Duration::from_secs_f64(delay)
    }

    async fn mock_response(
        &self,
        query: &str,
        max_results: usize,
        fallback_from: Option<&SearchError>,
    ) -> SearchResponse {
        let start = Instant::now();
        // The mock is infallible; the Result is part of the backend contract.
        let output = self
            .mock
            .search(query, max_results)
            .await
            .unwrap_or_default();
        let mut metadata = output.metadata.unwrap_or_else(|| json!({}));
        if let Some(err) = fallback_from {
            metadata["fallback_from"] = json!({
                "kind": err.kind.as_str(),
                "message": err.message,
            });
        }
        SearchResponse::ok(query, output.results, start.elapsed()).with_metadata(metadata)
    }

    fn record(&self, start: Instant, success: bool) {
        let elapsed = start.elapsed().as_secs_f64();
        let mut stats = self.stats.lock();
        stats.total_searches += 1;
        if success {
            stats.successful_searches += 1;
        }
        stats.total_search_time += elapsed;
        stats.avg_search_time = stats.total_search_time / stats.total_searches as f64;
    }

    pub fn stats(&self) -> SearchStats {
        self.stats.lock().clone()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}
