//! Seed verifier: basic feasibility check, verification-search
//! planning, multi-dimension search, and LLM seed enhancement.
//!
//! The verifier never fails its caller. Every degradation path (missing
//! registry, missing tools, LLM failures, search outages) produces a
//! usable [`SeedVerificationContext`] carrying the original seed and a
//! conservative score.

pub mod events;
#[cfg(test)]
mod tests;

pub use events::{ChannelSink, EventSink, StageEvent, VerifyStage};

use crate::core::rag::temporal;
use crate::core::router::LlmRouter;
use crate::core::tools::{IDEA_VERIFICATION_TOOL, ToolRegistry, WEB_SEARCH_TOOL};
use crate::core::types::{
    Priority, SearchDimension, SearchResult, SeedVerificationContext, SourceRef,
    ThinkingSeedContext,
};
use crate::utils::{char_len, extract_json, truncate_chars};
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Analytical vocabulary consulted by the heuristic seed check.
const ANALYTICAL_TOKENS: [&str; 7] = ["分析", "方法", "策略", "解决", "建议", "系统", "优化"];

/// Dimensions searched per verification round.
const MAX_SEARCHED_DIMENSIONS: usize = 3;
/// Evidence sources persisted per dimension.
const MAX_SOURCES_PER_DIMENSION: usize = 5;
/// Minimum length for an enhanced seed to count as a success.
const MIN_ENHANCED_CHARS: usize = 50;

/// Verifies and enhances thinking seeds.
pub struct SeedVerifier {
    registry: Option<Arc<dyn ToolRegistry>>,
    router: Option<Arc<LlmRouter>>,
}

impl SeedVerifier {
    pub fn new(registry: Option<Arc<dyn ToolRegistry>>, router: Option<Arc<LlmRouter>>) -> Self {
        Self { registry, router }
    }

    /// Run the verification pipeline. Always returns a completed
    /// context; failures along the way degrade and are recorded in
    /// `errors` instead of propagating.
    pub async fn verify(
        &self,
        seed_ctx: &ThinkingSeedContext,
        _execution_context: Option<&Value>,
        sink: Option<&dyn EventSink>,
    ) -> SeedVerificationContext {
        let start = Instant::now();
        let mut ctx =
            SeedVerificationContext::new(&seed_ctx.user_query, &seed_ctx.thinking_seed);
        info!(
            seed = %truncate_chars(&seed_ctx.thinking_seed, 50),
            "seed verification start"
        );
        emit(
            sink,
            VerifyStage::Start,
            "seed verification started",
            json!({"seed_preview": truncate_chars(&seed_ctx.thinking_seed, 100)}),
        );

        self.basic_verification(seed_ctx, &mut ctx).await;
        emit(
            sink,
            VerifyStage::BasicVerification,
            format!(
                "basic verification done, feasibility {:.2}",
                ctx.feasibility_score
            ),
            json!({
                "feasibility_score": ctx.feasibility_score,
                "verification_method": ctx.verification_method,
            }),
        );

        if let (Some(router), Some(registry)) = (self.router.as_deref(), self.registry.as_deref())
        {
            emit(
                sink,
                VerifyStage::PlanningStart,
                "planning verification search dimensions",
                json!({}),
            );
            let dimensions = self.plan_dimensions(router, seed_ctx, sink).await;
            ctx.search_dimensions = dimensions.clone();
            ctx.add_metric("search_dimensions_count", dimensions.len() as f64);
            emit(
                sink,
                VerifyStage::DimensionsPlanned,
                format!("planned {} search dimensions", dimensions.len()),
                json!({"dimensions": dimensions}),
            );

            if dimensions.is_empty() {
                info!("no search dimensions planned, keeping original seed");
            } else {
                let searched = self
                    .multi_dimension_search(registry, &dimensions, &mut ctx, sink)
                    .await;
                ctx.add_metric("search_results_count", ctx.verification_sources.len() as f64);

                if searched == 0 {
                    info!("multi-dimension search found nothing, keeping original seed");
                } else {
                    emit(
                        sink,
                        VerifyStage::EnhancementStart,
                        format!("integrating findings from {searched} dimensions"),
                        json!({"dimensions_with_results": searched}),
                    );
                    self.enhance_seed(router, seed_ctx, &mut ctx, sink).await;
                }
            }
        } else {
            debug!("router or tool registry missing, skipping enhancement flow");
        }

        let elapsed = start.elapsed().as_secs_f64();
        ctx.add_metric("verification_time", elapsed);
        ctx.add_metric("feasibility_confidence", ctx.feasibility_score as f64);
        // Verification never blocks the pipeline; consumers threshold
        // the raw score when they want a hard gate.
        ctx.verification_passed = true;
        info!(
            elapsed,
            score = ctx.feasibility_score,
            method = %ctx.verification_method,
            "seed verification complete"
        );
        emit(
            sink,
            VerifyStage::Complete,
            format!(
                "verification complete in {elapsed:.2}s, feasibility {:.2}",
                ctx.feasibility_score
            ),
            json!({
                "verification_time": elapsed,
                "feasibility_score": ctx.feasibility_score,
                "verification_method": ctx.verification_method,
                "enhanced": ctx.was_enhanced(),
            }),
        );
        ctx
    }

    // ---- Step 1: basic verification ---------------------------------------

    async fn basic_verification(
        &self,
        seed_ctx: &ThinkingSeedContext,
        ctx: &mut SeedVerificationContext,
    ) {
        let Some(registry) = self.registry.as_deref() else {
            warn!("tool registry unavailable, using simplified verification");
            ctx.feasibility_score = 0.6;
            ctx.verification_method = "simplified_heuristic".to_string();
            ctx.evidence
                .push("tool registry unavailable, heuristic verification".to_string());
            return;
        };

        if !registry.has_tool(IDEA_VERIFICATION_TOOL) {
            warn!("idea_verification tool unavailable, using heuristic check");
            let seed = &seed_ctx.thinking_seed;
            let length = char_len(seed);
            let analytical = ANALYTICAL_TOKENS.iter().any(|token| seed.contains(token));
            if length > 30 && analytical {
                ctx.feasibility_score = 0.7;
                ctx.evidence.push(format!("seed length: {length} chars"));
                ctx.evidence.push("contains analytical vocabulary".to_string());
            } else {
                ctx.feasibility_score = 0.5;
                ctx.evidence.push(format!("seed length: {length} chars"));
                ctx.evidence.push("basic check passed".to_string());
            }
            ctx.verification_method = "heuristic_analysis".to_string();
            return;
        }

        info!("running fact verification through idea_verification");
        let args = json!({
            "idea_text": seed_ctx.thinking_seed,
            "context": {"user_query": seed_ctx.user_query},
        });
        let output = registry.execute_tool(IDEA_VERIFICATION_TOOL, args).await;

        if output.success {
            let score = output.data["feasibility_score"].as_f64().unwrap_or(0.7);
            ctx.feasibility_score = (score as f32).clamp(0.0, 1.0);
            ctx.verification_method = "idea_verification_tool".to_string();
            if let Some(findings) = output.data["key_findings"].as_array() {
                ctx.evidence.extend(
                    findings
                        .iter()
                        .filter_map(|f| f.as_str().map(str::to_string)),
                );
            }
            if let Ok(results) = serde_json::from_value::<Vec<SearchResult>>(
                output.data["search_results"].clone(),
            ) {
                for result in results.iter().take(MAX_SOURCES_PER_DIMENSION) {
                    ctx.verification_sources
                        .push(SourceRef::from_result(result, None));
                }
            }
            info!(score = ctx.feasibility_score, "fact verification succeeded");
        } else {
            let reason = output.error.unwrap_or_else(|| "unknown error".to_string());
            warn!("idea_verification failed ({reason}), using simplified fallback");
            ctx.feasibility_score = 0.6;
            ctx.verification_method = "simplified_fallback".to_string();
            ctx.evidence
                .push("verification tool failed, simplified verification".to_string());
            ctx.add_error(format!("idea_verification failed: {reason}"));
        }
    }

    // ---- Step 2: dimension planning ---------------------------------------

    async fn plan_dimensions(
        &self,
        router: &LlmRouter,
        seed_ctx: &ThinkingSeedContext,
        sink: Option<&dyn EventSink>,
    ) -> Vec<SearchDimension> {
        let year = temporal::current_year();
        let date = temporal::current_date();

        let prompt = format!(
            "You are an information-search planning expert.\n\
             \n\
             Current time information (always use when planning):\n\
             - Current year: {year}\n\
             - Current date: {date}\n\
             - When fresh information is needed, search queries must use {year}, never an \
             earlier year.\n\
             \n\
             User question: {question}\n\
             \n\
             Initial thinking seed:\n{seed}\n\
             \n\
             Analyze the seed and plan which dimensions to search so it can be verified \
             and enriched with current information. Plan at most 5 dimensions; each query \
             must be concrete and directly executable.\n\
             \n\
             Respond with strict JSON only:\n\
             {{\n\
               \"dimensions\": [\n\
                 {{\"dimension\": \"name\", \"query\": \"search query\", \
             \"priority\": \"high|medium|low\", \"reason\": \"why this dimension\"}}\n\
               ]\n\
             }}",
            question = seed_ctx.user_query,
            seed = seed_ctx.thinking_seed,
        );

        let reply = self
            .call_with_streaming(router, &prompt, 0.7, sink, VerifyStage::PlanningChunk)
            .await;
        let Some(reply) = reply else {
            info!("LLM planning unavailable, using heuristic dimensions");
            return heuristic_dimensions(seed_ctx);
        };

        let Some(value) = extract_json(&reply) else {
            warn!("no JSON in planning reply, using heuristic dimensions");
            return heuristic_dimensions(seed_ctx);
        };
        let dimensions: Vec<SearchDimension> = value["dimensions"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let name = item["dimension"].as_str()?.to_string();
                        let query = item["query"].as_str()?.to_string();
                        if query.is_empty() {
                            return None;
                        }
                        Some(SearchDimension {
                            name,
                            query,
                            priority: Priority::parse(
                                item["priority"].as_str().unwrap_or("medium"),
                            ),
                            reason: item["reason"].as_str().unwrap_or_default().to_string(),
                        })
                    })
                    .take(5)
                    .collect()
            })
            .unwrap_or_default();

        if dimensions.is_empty() {
            warn!("planning reply held no usable dimensions, using heuristics");
            return heuristic_dimensions(seed_ctx);
        }
        info!(count = dimensions.len(), "search dimensions planned");
        dimensions
    }

    // ---- Step 3: multi-dimension search -----------------------------------

    /// Search the top dimensions by priority. Returns how many produced
    /// results; individual failures are non-fatal.
    async fn multi_dimension_search(
        &self,
        registry: &dyn ToolRegistry,
        dimensions: &[SearchDimension],
        ctx: &mut SeedVerificationContext,
        sink: Option<&dyn EventSink>,
    ) -> usize {
        if !registry.has_tool(WEB_SEARCH_TOOL) {
            warn!("web_search tool unavailable, skipping dimension search");
            return 0;
        }

        let mut sorted: Vec<&SearchDimension> = dimensions.iter().collect();
        sorted.sort_by_key(|dim| std::cmp::Reverse(dim.priority.rank()));

        let mut productive = 0usize;
        for dimension in sorted.into_iter().take(MAX_SEARCHED_DIMENSIONS) {
            emit(
                sink,
                VerifyStage::DimensionSearchStart,
                format!("searching dimension '{}'", dimension.name),
                json!({"dimension": dimension.name, "query": dimension.query}),
            );

            let output = registry
                .execute_tool(WEB_SEARCH_TOOL, json!({"query": dimension.query}))
                .await;
            if !output.success {
                let reason = output.error.unwrap_or_else(|| "unknown error".to_string());
                warn!(dimension = %dimension.name, "dimension search failed: {reason}");
                ctx.add_error(format!(
                    "search failed for dimension '{}': {reason}",
                    dimension.name
                ));
                emit(
                    sink,
                    VerifyStage::DimensionSearchResult,
                    format!("dimension '{}' search failed", dimension.name),
                    json!({"dimension": dimension.name, "success": false}),
                );
                continue;
            }

            let results: Vec<SearchResult> =
                serde_json::from_value(output.data["results"].clone()).unwrap_or_default();
            if results.is_empty() {
                debug!(dimension = %dimension.name, "dimension search returned nothing");
                emit(
                    sink,
                    VerifyStage::DimensionSearchResult,
                    format!("dimension '{}' returned no results", dimension.name),
                    json!({"dimension": dimension.name, "success": true, "result_count": 0}),
                );
                continue;
            }

            info!(
                dimension = %dimension.name,
                count = results.len(),
                "dimension search succeeded"
            );
            emit(
                sink,
                VerifyStage::DimensionSearchResult,
                format!(
                    "dimension '{}' found {} results",
                    dimension.name,
                    results.len()
                ),
                json!({
                    "dimension": dimension.name,
                    "success": true,
                    "result_count": results.len(),
                }),
            );
            for result in results.iter().take(MAX_SOURCES_PER_DIMENSION) {
                ctx.verification_sources
                    .push(SourceRef::from_result(result, Some(dimension.name.clone())));
            }
            ctx.multidim_results.insert(dimension.name.clone(), results);
            productive += 1;
        }
        productive
    }

    // ---- Step 4: enhancement ----------------------------------------------

    async fn enhance_seed(
        &self,
        router: &LlmRouter,
        seed_ctx: &ThinkingSeedContext,
        ctx: &mut SeedVerificationContext,
        sink: Option<&dyn EventSink>,
    ) {
        let summary = build_search_summary(ctx);
        let year = temporal::current_year();
        let date = temporal::current_date();

        let prompt = format!(
            "You are a thinking-seed enhancement expert.\n\
             \n\
             Important time information:\n\
             - Current year: {year}\n\
             - Current date: {date}\n\
             - Information dated {year} in the findings below takes priority over \
             anything older.\n\
             \n\
             User question: {question}\n\
             \n\
             Original thinking seed:\n{seed}\n\
             \n\
             Latest search findings:\n{summary}\n\
             \n\
             Produce an enhanced thinking seed that:\n\
             1. keeps the original seed's core reasoning and structure;\n\
             2. integrates the search findings for depth and breadth;\n\
             3. uses {year} when describing recent developments;\n\
             4. stays coherent and clearly written;\n\
             5. is 200-400 characters long.\n\
             \n\
             Output the enhanced seed as plain text only, with no extra commentary.",
            question = seed_ctx.user_query,
            seed = seed_ctx.thinking_seed,
        );

        let reply = self
            .call_with_streaming(router, &prompt, 0.7, sink, VerifyStage::EnhancementChunk)
            .await;
        let enhanced = reply.map(|text| text.trim().to_string()).unwrap_or_default();

        if char_len(&enhanced) >= MIN_ENHANCED_CHARS {
            let old_score = ctx.feasibility_score;
            ctx.feasibility_score = (old_score + 0.2).min(0.9);
            ctx.verification_method = "llm_enhanced_verification".to_string();
            ctx.evidence
                .push("integrated search findings into an enhanced seed".to_string());
            ctx.enhanced_seed = enhanced;
            info!(
                old_score,
                new_score = ctx.feasibility_score,
                length = char_len(&ctx.enhanced_seed),
                "seed enhancement succeeded"
            );
            emit(
                sink,
                VerifyStage::EnhancementComplete,
                "enhanced seed generated",
                json!({
                    "enhanced": true,
                    "seed_length": char_len(&ctx.enhanced_seed),
                    "old_score": old_score,
                    "new_score": ctx.feasibility_score,
                }),
            );
        } else {
            warn!("enhancement output too short, keeping the original seed");
            ctx.add_error("enhancement produced too little output".to_string());
            emit(
                sink,
                VerifyStage::EnhancementComplete,
                "enhancement unsuccessful, original seed retained",
                json!({"enhanced": false}),
            );
        }
    }

    /// Prefer the streaming path, forwarding chunks as events; fall back
    /// to a single blocking call when streaming is unavailable or the
    /// stream breaks mid-way.
    async fn call_with_streaming(
        &self,
        router: &LlmRouter,
        prompt: &str,
        temperature: f32,
        sink: Option<&dyn EventSink>,
        chunk_stage: VerifyStage,
    ) -> Option<String> {
        match router.call_stream(prompt, None, Some(temperature)).await {
            Ok(mut stream) => {
                let mut content = String::new();
                let mut broken = false;
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(text) => {
                            emit(sink, chunk_stage, text.clone(), json!({"is_chunk": true}));
                            content.push_str(&text);
                        }
                        Err(e) => {
                            warn!("stream broke mid-way ({e}), falling back to blocking call");
                            broken = true;
                            break;
                        }
                    }
                }
                if !broken && !content.trim().is_empty() {
                    return Some(content);
                }
            }
            Err(e) => debug!("streaming unavailable ({e}), using blocking call"),
        }

        match router.call(prompt, None, Some(temperature)).await {
            Ok(content) => Some(content),
            Err(e) => {
                warn!("blocking LLM call failed: {e}");
                None
            }
        }
    }
}

/// Heuristic fallback dimensions derived from the question's shape.
fn heuristic_dimensions(seed_ctx: &ThinkingSeedContext) -> Vec<SearchDimension> {
    const HOW_WHAT: [&str; 8] = ["是什么", "原理", "如何", "怎么", "技术", "算法", "how", "what"];
    const COMPARE: [&str; 6] = ["区别", "对比", "比较", "vs", "versus", "difference"];
    const TREND: [&str; 7] = ["最新", "趋势", "发展", "未来", "latest", "trend", "current"];

    let year = temporal::current_year();
    let query = &seed_ctx.user_query;
    let lower = query.to_lowercase();
    let topic = truncate_chars(query, 50);
    let mut dimensions = Vec::new();

    if HOW_WHAT.iter().any(|k| lower.contains(k)) {
        dimensions.push(SearchDimension {
            name: "core concepts".to_string(),
            query: format!("{topic} definition concepts"),
            priority: Priority::High,
            reason: "ground the fundamentals".to_string(),
        });
        dimensions.push(SearchDimension {
            name: "practical applications".to_string(),
            query: format!("{topic} applications practice"),
            priority: Priority::Medium,
            reason: "see how it is used".to_string(),
        });
    }
    if COMPARE.iter().any(|k| lower.contains(k)) {
        dimensions.push(SearchDimension {
            name: "comparison".to_string(),
            query: format!("{topic} comparison"),
            priority: Priority::High,
            reason: "contrast the alternatives".to_string(),
        });
    }
    if TREND.iter().any(|k| lower.contains(k)) || lower.contains(&year.to_string()) {
        dimensions.push(SearchDimension {
            name: "latest progress".to_string(),
            query: format!("{topic} {year} latest"),
            priority: Priority::High,
            reason: format!("capture {year} developments"),
        });
    }
    if dimensions.len() < 2 {
        dimensions.push(SearchDimension {
            name: "background".to_string(),
            query: truncate_chars(query, 60).to_string(),
            priority: Priority::Medium,
            reason: "gather general background".to_string(),
        });
    }
    dimensions.truncate(3);
    debug!(count = dimensions.len(), "heuristic dimensions generated");
    dimensions
}

/// Per-dimension findings summary fed to the enhancement prompt.
fn build_search_summary(ctx: &SeedVerificationContext) -> String {
    if ctx.multidim_results.is_empty() {
        return "(no search results)".to_string();
    }
    let mut parts = Vec::new();
    // Iterate in planned-dimension order; HashMap order is unstable.
    for dimension in &ctx.search_dimensions {
        if let Some(results) = ctx.multidim_results.get(&dimension.name) {
            let content = serde_json::to_string(results).unwrap_or_default();
            parts.push(format!(
                "[{}]\n{}...",
                dimension.name,
                truncate_chars(&content, 200)
            ));
        }
    }
    parts.join("\n\n")
}

fn emit(sink: Option<&dyn EventSink>, stage: VerifyStage, content: impl Into<String>, metadata: Value) {
    if let Some(sink) = sink {
        if let Err(e) = sink.send(StageEvent::new(stage, content, metadata)) {
            debug!("event emission failed: {e}");
        }
    }
}
