//! Verifier pipeline tests: degradation ladder, enhancement
//! monotonicity, priority ordering, and event emission.

use super::*;
use crate::config::{CostConfig, ManagerConfig};
use crate::core::providers::ChatCompletion;
use crate::core::tools::ToolOutput;
use crate::core::types::{ChatMessage, ChatResponse, CompletionOptions, ProviderError};
use async_trait::async_trait;
use parking_lot::Mutex as PlMutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

struct ScriptedChat {
    replies: PlMutex<VecDeque<String>>,
}

impl ScriptedChat {
    fn new(replies: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            replies: PlMutex::new(replies.into_iter().map(str::to_string).collect()),
        })
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

fn router_with(chat: Arc<ScriptedChat>) -> Arc<LlmRouter> {
    Arc::new(LlmRouter::with_providers(
        vec![("scripted-llm".to_string(), chat as Arc<dyn ChatCompletion>)],
        ManagerConfig {
            preferred_providers: vec!["scripted-llm".to_string()],
            ..ManagerConfig::default()
        },
        CostConfig::default(),
    ))
}

/// Registry with a configurable verification outcome and scripted
/// search results; records every search query it receives.
struct FakeRegistry {
    verification: Option<ToolOutput>,
    search_available: bool,
    search_failures: usize,
    queries: PlMutex<Vec<String>>,
    served: AtomicU32,
}

impl FakeRegistry {
    fn new(verification: Option<ToolOutput>) -> Arc<Self> {
        Arc::new(Self {
            verification,
            search_available: true,
            search_failures: 0,
            queries: PlMutex::new(Vec::new()),
            served: AtomicU32::new(0),
        })
    }

    fn without_search(verification: Option<ToolOutput>) -> Arc<Self> {
        Arc::new(Self {
            verification,
            search_available: false,
            search_failures: 0,
            queries: PlMutex::new(Vec::new()),
            served: AtomicU32::new(0),
        })
    }

    fn verification_ok(score: f64) -> ToolOutput {
        ToolOutput::ok(serde_json::json!({
            "feasibility_score": score,
            "verification_passed": true,
            "key_findings": ["evidence-backed finding"],
            "search_results": [
                {"title": "basis a", "snippet": "snippet a", "url": "https://v.example/a", "relevance": 0.9},
                {"title": "basis b", "snippet": "snippet b", "url": "https://v.example/b", "relevance": 0.8},
            ],
        }))
    }

    fn recorded_queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl ToolRegistry for FakeRegistry {
    fn has_tool(&self, name: &str) -> bool {
        match name {
            IDEA_VERIFICATION_TOOL => self.verification.is_some(),
            WEB_SEARCH_TOOL => self.search_available,
            _ => false,
        }
    }

    async fn execute_tool(&self, name: &str, args: serde_json::Value) -> ToolOutput {
        match name {
            IDEA_VERIFICATION_TOOL => self
                .verification
                .clone()
                .unwrap_or_else(|| ToolOutput::failure("not configured")),
            WEB_SEARCH_TOOL => {
                let query = args["query"].as_str().unwrap_or_default().to_string();
                self.queries.lock().push(query.clone());
                let call = self.served.fetch_add(1, Ordering::SeqCst) as usize;
                if call < self.search_failures {
                    return ToolOutput::failure("scripted search outage");
                }
                ToolOutput::ok(serde_json::json!({
                    "query": query,
                    "results": [
                        {
                            "title": format!("doc one for {query}"),
                            "snippet": "first finding snippet",
                            "url": format!("https://d.example/{call}/1"),
                            "relevance": 0.9,
                        },
                        {
                            "title": format!("doc two for {query}"),
                            "snippet": "second finding snippet",
                            "url": format!("https://d.example/{call}/2"),
                            "relevance": 0.7,
                        },
                    ],
                }))
            }
            _ => ToolOutput::failure("unknown tool"),
        }
    }
}

const DIMENSIONS_JSON: &str = r#"{
    "dimensions": [
        {"dimension": "current state", "query": "rust async runtime landscape", "priority": "high", "reason": "freshness"},
        {"dimension": "best practices", "query": "rust async patterns", "priority": "medium", "reason": "practice"}
    ]
}"#;

const ENHANCED_TEXT: &str = "The original reasoning holds: an incremental verification \
pipeline remains the right framing. Current evidence adds three refinements: mature \
runtimes now dominate production deployments, structured concurrency patterns have \
displaced ad-hoc task spawning, and recent ecosystem work makes cancellation-correct \
pipelines considerably easier to build and operate than before.";

fn seed_ctx() -> ThinkingSeedContext {
    ThinkingSeedContext::new(
        "what is the current state of rust async runtimes",
        "A structured 分析 of async runtime options weighing scheduler design, ecosystem \
         maturity, and operational 策略 for production adoption.",
    )
}

#[tokio::test]
async fn missing_registry_degrades_to_simplified_heuristic() {
    let verifier = SeedVerifier::new(None, None);
    let ctx = verifier.verify(&seed_ctx(), None, None).await;

    assert!((ctx.feasibility_score - 0.6).abs() < 1e-6);
    assert_eq!(ctx.verification_method, "simplified_heuristic");
    assert!(ctx.verification_passed);
    assert_eq!(ctx.enhanced_seed, ctx.original_seed);
}

#[tokio::test]
async fn missing_tool_uses_length_and_vocabulary_heuristic() {
    let registry = FakeRegistry::without_search(None);
    let verifier = SeedVerifier::new(Some(registry), None);

    let ctx = verifier.verify(&seed_ctx(), None, None).await;
    assert!((ctx.feasibility_score - 0.7).abs() < 1e-6);
    assert_eq!(ctx.verification_method, "heuristic_analysis");

    let short = ThinkingSeedContext::new("q", "too short");
    let registry = FakeRegistry::without_search(None);
    let verifier = SeedVerifier::new(Some(registry), None);
    let ctx = verifier.verify(&short, None, None).await;
    assert!((ctx.feasibility_score - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn failing_verification_tool_degrades_without_propagating() {
    let registry = FakeRegistry::new(Some(ToolOutput::failure("backend exploded")));
    let verifier = SeedVerifier::new(Some(registry), None);

    let ctx = verifier.verify(&seed_ctx(), None, None).await;
    assert!((ctx.feasibility_score - 0.6).abs() < 1e-6);
    assert_eq!(ctx.verification_method, "simplified_fallback");
    assert!(ctx.verification_passed);
    assert!(!ctx.errors.is_empty());
}

#[tokio::test]
async fn successful_enhancement_raises_score_by_point_two() {
    let registry = FakeRegistry::new(Some(FakeRegistry::verification_ok(0.6)));
    let chat = ScriptedChat::new(vec![DIMENSIONS_JSON, ENHANCED_TEXT]);
    let verifier = SeedVerifier::new(Some(registry), Some(router_with(chat)));

    let ctx = verifier.verify(&seed_ctx(), None, None).await;

    assert!((ctx.feasibility_score - 0.8).abs() < 1e-6);
    assert_eq!(ctx.verification_method, "llm_enhanced_verification");
    assert_ne!(ctx.enhanced_seed, ctx.original_seed);
    assert!(ctx.enhanced_seed.chars().count() >= 50);
    assert!(ctx.verification_passed);
    assert_eq!(ctx.search_dimensions.len(), 2);
    assert_eq!(ctx.multidim_results.len(), 2);
    // Two sources from basic verification plus two per dimension.
    assert_eq!(ctx.verification_sources.len(), 6);
}

#[tokio::test]
async fn enhancement_score_is_capped_at_point_nine() {
    let registry = FakeRegistry::new(Some(FakeRegistry::verification_ok(0.85)));
    let chat = ScriptedChat::new(vec![DIMENSIONS_JSON, ENHANCED_TEXT]);
    let verifier = SeedVerifier::new(Some(registry), Some(router_with(chat)));

    let ctx = verifier.verify(&seed_ctx(), None, None).await;
    assert!((ctx.feasibility_score - 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn short_enhancement_output_keeps_the_original_seed() {
    let registry = FakeRegistry::new(Some(FakeRegistry::verification_ok(0.6)));
    let chat = ScriptedChat::new(vec![DIMENSIONS_JSON, "nope"]);
    let verifier = SeedVerifier::new(Some(registry), Some(router_with(chat)));

    let ctx = verifier.verify(&seed_ctx(), None, None).await;
    assert_eq!(ctx.enhanced_seed, ctx.original_seed);
    assert!((ctx.feasibility_score - 0.6).abs() < 1e-6);
    assert_eq!(ctx.verification_method, "idea_verification_tool");
    assert!(ctx.errors.iter().any(|e| e.contains("enhancement")));
}

#[tokio::test]
async fn dimension_search_failures_are_non_fatal() {
    let registry = Arc::new(FakeRegistry {
        verification: Some(FakeRegistry::verification_ok(0.6)),
        search_available: true,
        search_failures: 1,
        queries: PlMutex::new(Vec::new()),
        served: AtomicU32::new(0),
    });
    let chat = ScriptedChat::new(vec![DIMENSIONS_JSON, ENHANCED_TEXT]);
    let verifier = SeedVerifier::new(Some(Arc::clone(&registry) as Arc<dyn ToolRegistry>), Some(router_with(chat)));

    let ctx = verifier.verify(&seed_ctx(), None, None).await;
    // First dimension fails, second still feeds enhancement.
    assert_eq!(ctx.multidim_results.len(), 1);
    assert_eq!(ctx.verification_method, "llm_enhanced_verification");
    assert!(ctx.errors.iter().any(|e| e.contains("search failed")));
}

#[tokio::test]
async fn high_priority_dimensions_are_searched_first_capped_at_three() {
    let dims = r#"{
        "dimensions": [
            {"dimension": "d1", "query": "q-low-1", "priority": "low", "reason": ""},
            {"dimension": "d2", "query": "q-high-1", "priority": "high", "reason": ""},
            {"dimension": "d3", "query": "q-medium-1", "priority": "medium", "reason": ""},
            {"dimension": "d4", "query": "q-high-2", "priority": "high", "reason": ""},
            {"dimension": "d5", "query": "q-low-2", "priority": "low", "reason": ""}
        ]
    }"#;
    let registry = FakeRegistry::new(Some(FakeRegistry::verification_ok(0.6)));
    let chat = ScriptedChat::new(vec![dims, ENHANCED_TEXT]);
    let verifier = SeedVerifier::new(
        Some(Arc::clone(&registry) as Arc<dyn ToolRegistry>),
        Some(router_with(chat)),
    );

    let ctx = verifier.verify(&seed_ctx(), None, None).await;
    assert_eq!(ctx.search_dimensions.len(), 5);
    assert_eq!(
        registry.recorded_queries(),
        vec!["q-high-1", "q-high-2", "q-medium-1"],
        "top three by priority, stable within a rank"
    );
}

#[tokio::test]
async fn unparseable_planning_reply_falls_back_to_heuristic_dimensions() {
    let registry = FakeRegistry::new(Some(FakeRegistry::verification_ok(0.6)));
    let chat = ScriptedChat::new(vec!["no structured payload here", ENHANCED_TEXT]);
    let verifier = SeedVerifier::new(Some(registry), Some(router_with(chat)));

    let ctx = verifier.verify(&seed_ctx(), None, None).await;
    assert!(!ctx.search_dimensions.is_empty());
    assert!(ctx.search_dimensions.len() <= 3);
}

#[tokio::test]
async fn events_bracket_the_run_and_cover_every_step() {
    let registry = FakeRegistry::new(Some(FakeRegistry::verification_ok(0.6)));
    let chat = ScriptedChat::new(vec![DIMENSIONS_JSON, ENHANCED_TEXT]);
    let verifier = SeedVerifier::new(Some(registry), Some(router_with(chat)));

    let (sink, mut rx) = ChannelSink::new();
    verifier.verify(&seed_ctx(), None, Some(&sink)).await;

    let mut stages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        stages.push(event.stage);
    }
    assert_eq!(stages.first(), Some(&VerifyStage::Start));
    assert_eq!(stages.last(), Some(&VerifyStage::Complete));
    for expected in [
        VerifyStage::BasicVerification,
        VerifyStage::PlanningStart,
        VerifyStage::DimensionsPlanned,
        VerifyStage::DimensionSearchStart,
        VerifyStage::DimensionSearchResult,
        VerifyStage::EnhancementStart,
        VerifyStage::EnhancementComplete,
    ] {
        assert!(stages.contains(&expected), "missing stage {expected:?}");
    }
}

#[tokio::test]
async fn closed_sink_never_disturbs_verification() {
    let registry = FakeRegistry::new(Some(FakeRegistry::verification_ok(0.6)));
    let chat = ScriptedChat::new(vec![DIMENSIONS_JSON, ENHANCED_TEXT]);
    let verifier = SeedVerifier::new(Some(registry), Some(router_with(chat)));

    let (sink, rx) = ChannelSink::new();
    drop(rx);
    let ctx = verifier.verify(&seed_ctx(), None, Some(&sink)).await;
    assert!((ctx.feasibility_score - 0.8).abs() < 1e-6);
}

#[test]
fn heuristic_dimensions_follow_the_question_shape() {
    let how = ThinkingSeedContext::new("how does a B-tree work", "seed");
    let dims = heuristic_dimensions(&how);
    assert!(dims.iter().any(|d| d.name == "core concepts"));
    assert!(dims.iter().any(|d| d.name == "practical applications"));

    let versus = ThinkingSeedContext::new("tokio vs async-std", "seed");
    let dims = heuristic_dimensions(&versus);
    assert!(dims.iter().any(|d| d.name == "comparison"));

    let trendy = ThinkingSeedContext::new("latest llm inference servers", "seed");
    let dims = heuristic_dimensions(&trendy);
    let year = temporal::current_year().to_string();
    assert!(
        dims.iter()
            .any(|d| d.name == "latest progress" && d.query.contains(&year))
    );

    let plain = ThinkingSeedContext::new("tell me about turtles", "seed");
    let dims = heuristic_dimensions(&plain);
    assert!(!dims.is_empty());
    assert!(dims.len() <= 3);
}
