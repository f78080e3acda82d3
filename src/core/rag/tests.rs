//! Pipeline tests: temporal injection, query construction, parallel
//! fan-out, caching, and degraded synthesis.

use super::*;
use crate::config::{CostConfig, ManagerConfig, RagConfig};
use crate::core::providers::ChatCompletion;
use crate::core::search::{BackendOutput, SearchBackend, SearchRateLimiter};
use crate::core::types::{
    ChatMessage, ChatResponse, CompletionOptions, ErrorKind, ProviderError, SearchError,
};
use async_trait::async_trait;
use parking_lot::Mutex as PlMutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

struct ScriptedChat {
    replies: PlMutex<VecDeque<String>>,
    calls: AtomicU32,
}

impl ScriptedChat {
    fn new(replies: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            replies: PlMutex::new(replies.into_iter().map(str::to_string).collect()),
            calls: AtomicU32::new(0),
        })
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatCompletion for ScriptedChat {
    fn name(&self) -> &str {
        "scripted-llm"
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _opts: &CompletionOptions,
    ) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| "plain text without json".to_string());
        Ok(ChatResponse::ok(
            reply,
            "scripted-llm",
            "scripted-model",
            Duration::from_millis(1),
        ))
    }

    async fn validate_config(&self) -> bool {
        true
    }

    async fn available_models(&self) -> Vec<String> {
        vec!["scripted-model".to_string()]
    }
}

struct ScriptedSearch {
    script: PlMutex<VecDeque<Result<BackendOutput, SearchError>>>,
    calls: AtomicU32,
}

impl ScriptedSearch {
    fn new(script: Vec<Result<BackendOutput, SearchError>>) -> Arc<Self> {
        Arc::new(Self {
            script: PlMutex::new(script.into_iter().collect()),
            calls: AtomicU32::new(0),
        })
    }

    fn output(url: &str, title: &str) -> BackendOutput {
        BackendOutput {
            results: vec![crate::core::types::SearchResult::new(
                title, "snippet", url, 0.9,
            )],
            metadata: None,
        }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearch {
    fn name(&self) -> &str {
        "scripted-search"
    }

    async fn search(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> Result<BackendOutput, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::output("https://scripted.example/default", "default")))
    }
}

fn mock_search_client() -> Arc<crate::core::search::WebSearchClient> {
    Arc::new(crate::core::search::WebSearchClient::with_backend(
        RagConfig::default(),
        Arc::new(crate::core::search::MockBackend),
        Arc::new(SearchRateLimiter::new(Duration::ZERO)),
    ))
}

fn real_search_client(
    backend: Arc<ScriptedSearch>,
) -> Arc<crate::core::search::WebSearchClient> {
    let cfg = RagConfig {
        enable_real_web_search: true,
        search_max_retries: 1,
        search_retry_base_delay: 0.001,
        ..RagConfig::default()
    };
    Arc::new(crate::core::search::WebSearchClient::with_backend(
        cfg,
        backend,
        Arc::new(SearchRateLimiter::new(Duration::ZERO)),
    ))
}

fn llm_router(chat: Arc<ScriptedChat>) -> Arc<crate::core::router::LlmRouter> {
    Arc::new(crate::core::router::LlmRouter::with_providers(
        vec![(
            "scripted-llm".to_string(),
            chat as Arc<dyn ChatCompletion>,
        )],
        ManagerConfig {
            preferred_providers: vec!["scripted-llm".to_string()],
            ..ManagerConfig::default()
        },
        CostConfig::default(),
    ))
}

const STRATEGY_JSON: &str = r#"{
    "search_intent": "find current facts",
    "domain_focus": "technology",
    "primary_keywords": ["rust async"],
    "secondary_keywords": ["tutorial"],
    "information_types": ["facts"],
    "search_depth": "medium"
}"#;

const SYNTHESIS_JSON: &str = r#"{
    "contextual_seed": "A fact-grounded seed about the rust async ecosystem, integrating retrieved evidence about runtimes, executors, and current adoption patterns.",
    "key_insights": ["tokio dominates production usage"],
    "knowledge_gaps": ["embedded async maturity"],
    "confidence_score": 0.85,
    "information_sources": ["https://example.com/rust-async"],
    "verification_status": "verified"
}"#;

#[tokio::test]
async fn heuristic_strategy_injects_current_year_for_time_flagged_queries() {
    let generator = RagSeedGenerator::new(None, mock_search_client(), RagConfig::default());
    let year = temporal::current_year();

    let strategy = generator.heuristic_strategy("Python 最新特性");
    assert!(
        strategy
            .primary_keywords
            .iter()
            .any(|k| k.contains(&year.to_string())),
        "expected a primary keyword carrying {year}, got {:?}",
        strategy.primary_keywords
    );
}

#[tokio::test]
async fn query_batch_contains_no_stale_years() {
    let generator = RagSeedGenerator::new(None, mock_search_client(), RagConfig::default());
    let year = temporal::current_year();

    let strategy = SearchStrategy {
        primary_keywords: vec![
            "rust 2019 edition".to_string(),
            "latest web frameworks".to_string(),
            "async io".to_string(),
        ],
        secondary_keywords: vec!["tutorial".to_string(), "guide".to_string()],
        ..SearchStrategy::default()
    };
    let queries = generator.build_queries(&strategy);

    assert_eq!(queries.len(), 5, "3 primaries + 4 combos capped at 5");
    for query in &queries {
        if temporal::has_year(query) {
            assert!(query.contains(&year.to_string()), "stale year in {query}");
        }
        if temporal::has_time_token(query) {
            assert!(query.contains(&year.to_string()), "missing year in {query}");
        }
    }
}

#[tokio::test]
async fn parallel_batch_survives_partial_failures_and_dedups() {
    let backend = ScriptedSearch::new(vec![
        Err(SearchError::new(ErrorKind::Parse, "bad json")),
        Ok(ScriptedSearch::output("https://a.example/1", "first")),
        Err(SearchError::new(ErrorKind::Parse, "bad json")),
        Ok(ScriptedSearch::output("https://a.example/2", "second")),
        Ok(ScriptedSearch::output("https://a.example/2", "duplicate")),
    ]);
    let generator = RagSeedGenerator::new(
        None,
        real_search_client(Arc::clone(&backend)),
        RagConfig::default(),
    );

    let strategy = SearchStrategy {
        primary_keywords: vec!["q1".to_string(), "q2".to_string(), "q3".to_string()],
        secondary_keywords: vec!["s1".to_string(), "s2".to_string()],
        ..SearchStrategy::default()
    };
    let results = generator
        .execute_search(&strategy, &CancellationToken::new())
        .await;

    assert_eq!(backend.call_count(), 5, "all five queries dispatched");
    assert!(results.len() <= 8);
    let mut urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), results.len(), "URLs must be pairwise distinct");
}

#[tokio::test]
async fn search_only_mode_yields_identical_seeds_via_cache() {
    let generator = RagSeedGenerator::new(None, mock_search_client(), RagConfig::default());

    let first = generator.generate("rust ownership model", None).await;
    let second = generator.generate("rust ownership model", None).await;

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(generator.stats().total_generations, 2);
    assert_eq!(generator.stats().successful_generations, 2);
}

#[tokio::test]
async fn llm_calls_are_cached_until_cleared() {
    let chat = ScriptedChat::new(vec![STRATEGY_JSON, SYNTHESIS_JSON]);
    let generator = RagSeedGenerator::new(
        Some(llm_router(Arc::clone(&chat))),
        mock_search_client(),
        RagConfig::default(),
    );

    let first = generator.generate("rust async runtimes", None).await;
    assert!(first.contains("fact-grounded seed"));
    assert_eq!(chat.call_count(), 2, "one planning call, one synthesis call");

    let second = generator.generate("rust async runtimes", None).await;
    assert_eq!(first, second);
    assert_eq!(chat.call_count(), 2, "cache hit must not re-issue LLM calls");

    generator.clear_cache();
    let third = generator.generate("rust async runtimes", None).await;
    assert_eq!(chat.call_count(), 4, "cleared cache re-issues LLM calls");
    // Script exhausted: non-JSON replies push both stages onto their
    // fallbacks, which still produce a seed.
    assert!(!third.is_empty());
}

#[tokio::test]
async fn empty_search_yields_insufficient_data_synthesis() {
    let backend = ScriptedSearch::new(vec![
        Err(SearchError::new(ErrorKind::Auth, "bad key")),
        Err(SearchError::new(ErrorKind::Auth, "bad key")),
        Err(SearchError::new(ErrorKind::Auth, "bad key")),
        Err(SearchError::new(ErrorKind::Auth, "bad key")),
        Err(SearchError::new(ErrorKind::Auth, "bad key")),
    ]);
    let generator = RagSeedGenerator::new(
        None,
        real_search_client(backend),
        RagConfig::default(),
    );

    let synthesis = generator
        .generate_detailed("anything", None, &CancellationToken::new())
        .await;
    assert_eq!(
        synthesis.verification_status,
        VerificationStatus::InsufficientData
    );
    assert!((synthesis.confidence - 0.3).abs() < 1e-6);
    assert!(synthesis.sources.is_empty());
    assert!(!synthesis.contextual_seed.is_empty());
}

#[tokio::test]
async fn cancellation_short_circuits_to_fallback_seed() {
    let backend = ScriptedSearch::new(Vec::new());
    let generator = RagSeedGenerator::new(
        None,
        real_search_client(Arc::clone(&backend)),
        RagConfig::default(),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let seed = generator
        .generate_with_cancel("rust ownership", None, &cancel)
        .await;

    assert!(seed.contains("could not be retrieved"));
    assert_eq!(backend.call_count(), 0, "no dispatch after cancellation");
}
