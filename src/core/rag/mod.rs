//! RAG seed generator: a three-stage plan -> search -> synthesize
//! pipeline producing a contextual thinking seed.
//!
//! Stage 1 plans a search strategy (LLM with heuristic fallback), stage
//! 2 fans searches out over a bounded worker pool and merges the
//! results, stage 3 synthesizes them into a fact-grounded seed. Every
//! stage degrades instead of failing: the caller always gets a seed.

pub mod cache;
pub mod temporal;
#[cfg(test)]
mod tests;

use crate::config::RagConfig;
use crate::core::router::LlmRouter;
use crate::core::search::{WebSearchClient, rank_and_trim};
use crate::core::types::{
    SearchDepth, SearchResult, SearchStrategy, Synthesis, VerificationStatus,
};
use crate::utils::{extract_json, truncate_chars};
use cache::{CACHE_CAPACITY, LruStore};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cumulative generation statistics.
#[derive(Debug, Clone, Default)]
pub struct GenerationStats {
    pub total_generations: u64,
    pub successful_generations: u64,
    pub avg_generation_time: f64,
}

/// Generates thinking seeds grounded in retrieved evidence.
pub struct RagSeedGenerator {
    router: Option<Arc<LlmRouter>>,
    search: Arc<WebSearchClient>,
    cfg: RagConfig,
    strategy_cache: LruStore<SearchStrategy>,
    information_cache: LruStore<Vec<SearchResult>>,
    synthesis_cache: LruStore<Synthesis>,
    stats: Mutex<GenerationStats>,
}

impl RagSeedGenerator {
    /// A generator without a router runs in search-only mode: heuristic
    /// planning and concatenation synthesis.
    pub fn new(
        router: Option<Arc<LlmRouter>>,
        search: Arc<WebSearchClient>,
        cfg: RagConfig,
    ) -> Self {
        if router.is_none() {
            info!("no LLM router supplied, RAG runs in search-only mode");
        }
        Self {
            router,
            search,
            cfg,
            strategy_cache: LruStore::new(CACHE_CAPACITY),
            information_cache: LruStore::new(CACHE_CAPACITY),
            synthesis_cache: LruStore::new(CACHE_CAPACITY),
            stats: Mutex::new(GenerationStats::default()),
        }
    }

    /// Generate a contextual seed. Never fails; internal errors degrade
    /// to a fallback seed.
    pub async fn generate(&self, query: &str, context: Option<&serde_json::Value>) -> String {
        self.generate_with_cancel(query, context, &CancellationToken::new())
            .await
    }

    /// Cancellable variant. Cancellation aborts at the next stage
    /// boundary and returns the fallback seed.
    pub async fn generate_with_cancel(
        &self,
        query: &str,
        context: Option<&serde_json::Value>,
        cancel: &CancellationToken,
    ) -> String {
        let synthesis = self.generate_detailed(query, context, cancel).await;
        if synthesis.contextual_seed.is_empty() {
            return self.fallback_seed(query);
        }
        synthesis.contextual_seed
    }

    /// Full pipeline run returning the synthesis record with sources,
    /// confidence, and verification status.
    pub async fn generate_detailed(
        &self,
        query: &str,
        context: Option<&serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Synthesis {
        let start = Instant::now();
        self.stats.lock().total_generations += 1;
        info!(query = %truncate_chars(query, 50), "seed generation start");

        if cancel.is_cancelled() {
            return self.cancelled_synthesis(query);
        }
        let strategy = self.plan_strategy(query, context).await;
        debug!(intent = %strategy.intent, "search strategy planned");

        if cancel.is_cancelled() {
            return self.cancelled_synthesis(query);
        }
        let results = self.execute_search(&strategy, cancel).await;
        info!(count = results.len(), "search stage complete");

        if cancel.is_cancelled() {
            return self.cancelled_synthesis(query);
        }
        let synthesis = self.synthesize(query, &strategy, &results, context).await;

        let elapsed = start.elapsed().as_secs_f64();
        {
            let mut stats = self.stats.lock();
            stats.successful_generations += 1;
            let total = stats.total_generations as f64;
            stats.avg_generation_time =
                (stats.avg_generation_time * (total - 1.0) + elapsed) / total;
        }
        info!(
            confidence = synthesis.confidence,
            sources = synthesis.sources.len(),
            "seed generation complete"
        );
        synthesis
    }

    /// Drop all cached strategies, search results, and syntheses.
    pub fn clear_cache(&self) {
        self.strategy_cache.clear();
        self.information_cache.clear();
        self.synthesis_cache.clear();
        info!("generator caches cleared");
    }

    pub fn stats(&self) -> GenerationStats {
        self.stats.lock().clone()
    }

    // ---- Stage 1: plan ----------------------------------------------------

    async fn plan_strategy(
        &self,
        query: &str,
        context: Option<&serde_json::Value>,
    ) -> SearchStrategy {
        let cache_key = format!("{query}::{}", hash_value(context));
        if let Some(strategy) = self.strategy_cache.get(&cache_key) {
            debug!("strategy cache hit");
            return strategy;
        }

        let strategy = if let Some(router) = &self.router {
            match self.llm_plan(router, query, context).await {
                Ok(strategy) => strategy,
                Err(reason) => {
                    warn!("LLM search planning failed ({reason}), using heuristics");
                    self.heuristic_strategy(query)
                }
            }
        } else {
            self.heuristic_strategy(query)
        };

        self.strategy_cache.put(cache_key, strategy.clone());
        strategy
    }

    async fn llm_plan(
        &self,
        router: &LlmRouter,
        query: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<SearchStrategy, String> {
        let year = temporal::current_year();
        let date = temporal::current_date();
        let context_block = context
            .map(|value| format!("\nExecution context:\n{value}\n"))
            .unwrap_or_default();

        let prompt = format!(
            "You are a professional information-retrieval strategist. Design a precise \
             search strategy for the question below.\n\
             \n\
             Current time information (always consult when generating keywords):\n\
             - Current year: {year}\n\
             - Current date: {date}\n\
             \n\
             User question: {query}\n\
             {context_block}\
             \n\
             Requirements:\n\
             1. Understand the core intent and information needs.\n\
             2. Identify the key concepts, entities, and technical terms.\n\
             3. IMPORTANT: when the question involves words like \"latest\" or \"current\", \
             generated keywords MUST use the current year {year}, never an earlier one.\n\
             4. Pick the best-fitting domain and information types.\n\
             5. Produce layered keyword combinations with correct time information.\n\
             \n\
             Respond with strict JSON only:\n\
             {{\n\
               \"search_intent\": \"core intent of the search\",\n\
               \"domain_focus\": \"primary domain (technology, business, academic, ...)\",\n\
               \"primary_keywords\": [\"keyword including {year} when time-sensitive\", \"...\"],\n\
               \"secondary_keywords\": [\"supplementary keyword\", \"...\"],\n\
               \"information_types\": [\"definitions\", \"tutorials\", \"statistics\", \"...\"],\n\
               \"search_depth\": \"shallow|medium|deep\"\n\
             }}"
        );

        let reply = router
            .call(&prompt, None, Some(0.3))
            .await
            .map_err(|e| e.to_string())?;
        let value = extract_json(&reply).ok_or("no JSON object in planning reply")?;

        let intent = value["search_intent"].as_str().unwrap_or_default();
        let domain = value["domain_focus"].as_str().unwrap_or_default();
        let primary = string_list(&value["primary_keywords"]);
        if intent.is_empty() || domain.is_empty() || primary.is_empty() {
            return Err("planning reply is missing required fields".to_string());
        }

        Ok(SearchStrategy {
            primary_keywords: primary,
            secondary_keywords: string_list(&value["secondary_keywords"]),
            intent: intent.to_string(),
            domain: domain.to_string(),
            info_types: string_list(&value["information_types"]),
            depth: SearchDepth::parse(value["search_depth"].as_str().unwrap_or("medium")),
        })
    }

    /// Keyword tokenization with mandatory temporal injection.
    fn heuristic_strategy(&self, query: &str) -> SearchStrategy {
        let year = temporal::current_year();
        let mut keywords: Vec<String> = Vec::new();

        if temporal::has_time_token(query) {
            keywords.push(format!("{year}年"));
            keywords.push(year.to_string());
            info!(year, "time-flagged query, injecting current year");
        }

        static WORD_RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new(r"\w+").expect("valid pattern"));
        for token in WORD_RE.find_iter(&query.to_lowercase()) {
            let token = token.as_str();
            if token.chars().count() > 3 && !keywords.iter().any(|k| k == token) {
                keywords.push(token.to_string());
            }
            if keywords.len() >= 7 {
                break;
            }
        }
        if keywords.is_empty() {
            keywords.push(query.trim().to_string());
        }

        let domain = detect_domain(query);
        SearchStrategy {
            primary_keywords: keywords,
            secondary_keywords: secondary_keywords_for(domain),
            intent: "find relevant factual information".to_string(),
            domain: domain.to_string(),
            info_types: vec!["facts".to_string(), "data".to_string(), "examples".to_string()],
            depth: SearchDepth::Medium,
        }
    }

    // ---- Stage 2: search --------------------------------------------------

    /// Build the query set: the first 3 primary keywords, plus up to 4
    /// primary/secondary combinations, capped at 5, year-corrected.
    fn build_queries(&self, strategy: &SearchStrategy) -> Vec<String> {
        let mut queries: Vec<String> = strategy
            .primary_keywords
            .iter()
            .take(3)
            .cloned()
            .collect();
        for primary in strategy.primary_keywords.iter().take(2) {
            for secondary in strategy.secondary_keywords.iter().take(2) {
                queries.push(format!("{primary} {secondary}"));
            }
        }
        queries.truncate(5);
        temporal::correct_queries(queries, temporal::current_year())
    }

    async fn execute_search(
        &self,
        strategy: &SearchStrategy,
        cancel: &CancellationToken,
    ) -> Vec<SearchResult> {
        let queries = self.build_queries(strategy);
        info!(count = queries.len(), "dispatching search queries");

        let mut merged: Vec<SearchResult> = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for query in queries {
            match self.information_cache.get(&query) {
                Some(cached) => merged.extend(cached),
                None => pending.push(query),
            }
        }

        let parallel = self.cfg.enable_parallel_search && pending.len() > 1;
        if parallel {
            debug!(workers = self.cfg.max_search_workers, "parallel search mode");
            let mut outcomes: Vec<(usize, String, crate::core::types::SearchResponse)> =
                futures::stream::iter(pending.into_iter().enumerate().map(|(index, query)| {
                    let search = Arc::clone(&self.search);
                    let cancel = cancel.clone();
                    async move {
                        // Cancellation skips unstarted queries; in-flight
                        // ones run to completion and are discarded later.
                        if cancel.is_cancelled() {
                            return None;
                        }
                        let response = search.search(&query, None).await;
                        Some((index, query, response))
                    }
                }))
                .buffer_unordered(self.cfg.max_search_workers.max(1))
                .collect::<Vec<_>>()
                .await
                .into_iter()
                .flatten()
                .collect();
            // Results are gathered in completion order; merge in query
            // order so identical inputs rank identically.
            outcomes.sort_by_key(|(index, _, _)| *index);
            for (_, query, response) in outcomes {
                if response.success {
                    self.information_cache.put(query.as_str(), response.results.clone());
                    merged.extend(response.results);
                } else {
                    warn!(query = %query, "search query failed, continuing batch");
                }
            }
        } else {
            for query in pending {
                if cancel.is_cancelled() {
                    break;
                }
                let response = self.search.search(&query, None).await;
                if response.success {
                    self.information_cache.put(query.as_str(), response.results.clone());
                    merged.extend(response.results);
                } else {
                    warn!(query = %query, "search query failed, continuing");
                }
            }
        }

        rank_and_trim(merged, strategy, self.cfg.max_search_results)
    }

    // ---- Stage 3: synthesize ---------------------------------------------

    async fn synthesize(
        &self,
        query: &str,
        strategy: &SearchStrategy,
        results: &[SearchResult],
        context: Option<&serde_json::Value>,
    ) -> Synthesis {
        if results.is_empty() {
            warn!("no search results, emitting degraded synthesis");
            return Synthesis {
                contextual_seed: format!(
                    "Preliminary analysis of '{query}'. No real-time information could be \
                     retrieved, so this seed rests on general knowledge alone; further \
                     research into current sources is recommended before planning."
                ),
                sources: Vec::new(),
                confidence: 0.3,
                key_insights: vec!["more information needed".to_string()],
                knowledge_gaps: vec!["real-time data missing".to_string()],
                verification_status: VerificationStatus::InsufficientData,
            };
        }

        let cache_key = synthesis_cache_key(query, results);
        if let Some(synthesis) = self.synthesis_cache.get(&cache_key) {
            debug!("synthesis cache hit");
            return synthesis;
        }

        let synthesis = if let Some(router) = &self.router {
            match self.llm_synthesize(router, query, strategy, results, context).await {
                Ok(synthesis) => synthesis,
                Err(reason) => {
                    warn!("LLM synthesis failed ({reason}), using concatenation fallback");
                    basic_synthesis(query, strategy, results)
                }
            }
        } else {
            basic_synthesis(query, strategy, results)
        };

        self.synthesis_cache.put(cache_key, synthesis.clone());
        synthesis
    }

    async fn llm_synthesize(
        &self,
        router: &LlmRouter,
        query: &str,
        strategy: &SearchStrategy,
        results: &[SearchResult],
        context: Option<&serde_json::Value>,
    ) -> Result<Synthesis, String> {
        let year = temporal::current_year();
        let date = temporal::current_date();

        let mut sources_block = String::new();
        for (index, result) in results.iter().take(6).enumerate() {
            sources_block.push_str(&format!(
                "Source {}: {}\n- URL: {}\n- Summary: {}\n",
                index + 1,
                result.title,
                result.url,
                result.snippet
            ));
        }
        let context_block = context
            .map(|value| format!("\nExecution context:\n{value}\n"))
            .unwrap_or_default();

        let prompt = format!(
            "You are a professional information analyst. Based on the user question and \
             the retrieved real-time information, produce a comprehensive, objective, \
             fact-grounded thinking seed.\n\
             \n\
             Key time information:\n\
             - Current year: {year}\n\
             - Current date: {date}\n\
             - IMPORTANT: your training data may be older than {year}. Where the search \
             results below conflict with what you remember, the search results win.\n\
             \n\
             User question: {query}\n\
             Search intent: {intent}\n\
             Domain focus: {domain}\n\
             \n\
             Search results (current as of {year}):\n\
             {sources_block}\
             {context_block}\
             \n\
             Respond with strict JSON only:\n\
             {{\n\
               \"contextual_seed\": \"fact-grounded thinking seed, 200-400 characters\",\n\
               \"key_insights\": [\"insight\", \"...\"],\n\
               \"knowledge_gaps\": [\"open question\", \"...\"],\n\
               \"confidence_score\": 0.85,\n\
               \"information_sources\": [\"url\", \"...\"],\n\
               \"verification_status\": \"verified|partially_verified|needs_verification\"\n\
             }}",
            intent = strategy.intent,
            domain = strategy.domain,
        );

        let reply = router
            .call(&prompt, None, Some(0.4))
            .await
            .map_err(|e| e.to_string())?;
        let value = extract_json(&reply).ok_or("no JSON object in synthesis reply")?;

        let seed = value["contextual_seed"].as_str().unwrap_or_default();
        if seed.is_empty() {
            return Err("synthesis reply has no contextual_seed".to_string());
        }
        let confidence = value["confidence_score"]
            .as_f64()
            .or_else(|| value["confidence"].as_f64())
            .unwrap_or(0.5)
            .clamp(0.0, 1.0) as f32;

        Ok(Synthesis {
            contextual_seed: seed.to_string(),
            sources: string_list(&value["information_sources"]),
            confidence,
            key_insights: string_list(&value["key_insights"]),
            knowledge_gaps: string_list(&value["knowledge_gaps"]),
            verification_status: VerificationStatus::parse(
                value["verification_status"].as_str().unwrap_or_default(),
            ),
        })
    }

    fn cancelled_synthesis(&self, query: &str) -> Synthesis {
        debug!("generation cancelled before next stage boundary");
        Synthesis {
            contextual_seed: self.fallback_seed(query),
            sources: Vec::new(),
            confidence: 0.3,
            key_insights: Vec::new(),
            knowledge_gaps: vec!["generation cancelled".to_string()],
            verification_status: VerificationStatus::InsufficientData,
        }
    }

    /// Static seed used when the pipeline cannot run at all.
    fn fallback_seed(&self, query: &str) -> String {
        format!(
            "Analysis of the question '{query}'. Real-time information could not be \
             retrieved, so consider the problem from these angles: 1) the core \
             requirements and constraints; 2) candidate solution paths and their \
             implications; 3) risks and challenges to account for; 4) established \
             practices and prior art. Gather up-to-date information before committing \
             to a plan."
        )
    }
}

/// Concatenation synthesis used when no LLM is available.
fn basic_synthesis(
    query: &str,
    strategy: &SearchStrategy,
    results: &[SearchResult],
) -> Synthesis {
    let mut parts = vec![format!(
        "Based on research of '{query}', {} sources yielded the following key points:",
        results.len()
    )];
    for (index, result) in results.iter().take(3).enumerate() {
        parts.push(format!(
            "{}. {}...",
            index + 1,
            truncate_chars(&result.snippet, 100)
        ));
    }
    parts.push(format!(
        "These findings indicate the relevance of {}. Recommend incorporating this \
         real-time information when forming a solution.",
        strategy.intent.to_lowercase()
    ));

    Synthesis {
        contextual_seed: parts.join(" "),
        sources: results.iter().take(3).map(|r| r.url.clone()).collect(),
        confidence: 0.6,
        key_insights: results.iter().take(3).map(|r| r.title.clone()).collect(),
        knowledge_gaps: vec!["needs deeper analysis".to_string()],
        verification_status: VerificationStatus::PartiallyVerified,
    }
}

fn detect_domain(query: &str) -> &'static str {
    const DOMAINS: &[(&str, &[&str])] = &[
        (
            "technology",
            &[
                "code", "software", "programming", "api", "algorithm", "system", "rust",
                "python", "技术", "编程", "算法", "系统",
            ],
        ),
        (
            "business",
            &["market", "business", "strategy", "revenue", "商业", "市场", "营销"],
        ),
        (
            "academic",
            &["research", "study", "paper", "theory", "学术", "研究", "理论"],
        ),
        ("health", &["health", "medical", "clinical", "健康", "医疗"]),
        ("creative", &["design", "creative", "art", "设计", "创意"]),
    ];

    let lower = query.to_lowercase();
    DOMAINS
        .iter()
        .map(|(domain, keywords)| {
            let hits = keywords.iter().filter(|k| lower.contains(**k)).count();
            (*domain, hits)
        })
        .filter(|(_, hits)| *hits > 0)
        .max_by_key(|(_, hits)| *hits)
        .map(|(domain, _)| domain)
        .unwrap_or("general")
}

fn secondary_keywords_for(domain: &str) -> Vec<String> {
    let keywords: &[&str] = match domain {
        "technology" => &["best practices", "tutorial"],
        "business" => &["case study", "market analysis"],
        "academic" => &["literature", "methodology"],
        "health" => &["guidelines", "symptoms"],
        "creative" => &["inspiration", "examples"],
        _ => &["guide", "tips"],
    };
    keywords.iter().take(4).map(|k| k.to_string()).collect()
}

fn string_list(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn hash_value(value: Option<&serde_json::Value>) -> u64 {
    let mut hasher = DefaultHasher::new();
    value
        .map(|v| v.to_string())
        .unwrap_or_default()
        .hash(&mut hasher);
    hasher.finish()
}

fn synthesis_cache_key(query: &str, results: &[SearchResult]) -> String {
    let mut hasher = DefaultHasher::new();
    query.hash(&mut hasher);
    for result in results {
        result.url.hash(&mut hasher);
    }
    format!("{query}::{:x}", hasher.finish())
}
