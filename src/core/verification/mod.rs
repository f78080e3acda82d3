//! Idea feasibility verification.
//!
//! Builds a focused verification query from a thinking seed and the
//! user's question, retrieves evidence, and scores feasibility through
//! LLM-driven semantic relevance judgment. Verification never fails the
//! caller: when search or the LLM is unavailable it degrades to a
//! text-heuristic analysis.

use crate::core::rag::cache::{CACHE_CAPACITY, LruStore};
use crate::core::rag::temporal;
use crate::core::router::LlmRouter;
use crate::core::search::WebSearchClient;
use crate::core::types::{IdeaVerificationReport, SearchResponse, SearchResult};
use crate::utils::{char_len, extract_json, truncate_chars};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Max evidence documents retrieved per verification.
const VERIFICATION_RESULTS: usize = 5;

/// Methodology vocabulary stripped from queries: searching for "how to
/// think about X" retrieves nothing that answers X.
const METHOD_WORDS: [&str; 12] = [
    "实用务实型",
    "解决方案",
    "系统分析",
    "批判性思维",
    "探索性研究",
    "创新思维",
    "方法",
    "策略",
    "思路",
    "方案",
    "角度",
    "途径",
];

/// Coarse question categories used to frame the judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Knowledge,
    Implementation,
    General,
}

impl QueryType {
    pub fn detect(text: &str) -> Self {
        const KNOWLEDGE: [&str; 14] = [
            "了解", "学习", "知识", "什么是", "介绍", "解释", "理解", "认识", "learn", "know",
            "understand", "what is", "introduce", "explain",
        ];
        const IMPLEMENTATION: [&str; 15] = [
            "实现", "开发", "构建", "设计", "创建", "搭建", "编写", "制作", "implement",
            "develop", "build", "create", "design", "code", "make",
        ];

        let lower = text.to_lowercase();
        let knowledge = KNOWLEDGE.iter().filter(|k| lower.contains(**k)).count();
        let implementation = IMPLEMENTATION.iter().filter(|k| lower.contains(**k)).count();
        if knowledge > implementation && knowledge > 0 {
            Self::Knowledge
        } else if implementation > knowledge && implementation > 0 {
            Self::Implementation
        } else {
            Self::General
        }
    }
}

/// Verification engine backing the `idea_verification` tool.
pub struct IdeaVerifier {
    router: Option<Arc<LlmRouter>>,
    search: Arc<WebSearchClient>,
    cache: LruStore<SearchResponse>,
}

impl IdeaVerifier {
    pub fn new(router: Option<Arc<LlmRouter>>, search: Arc<WebSearchClient>) -> Self {
        Self {
            router,
            search,
            cache: LruStore::new(CACHE_CAPACITY),
        }
    }

    /// Verify an idea's feasibility against retrieved evidence.
    ///
    /// Always returns a usable report; a failed search degrades to a
    /// text-heuristic analysis rather than an error.
    pub async fn verify_idea(
        &self,
        idea: &str,
        context: Option<&Value>,
    ) -> IdeaVerificationReport {
        info!(idea = %truncate_chars(idea, 50), "idea verification start");

        let response = self.search_for_verification(idea, context).await;
        if !response.success {
            let reason = response
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "search unavailable".to_string());
            warn!("verification search failed ({reason}), using text analysis");
            let (score, summary) = fallback_analysis(idea, &reason);
            return IdeaVerificationReport {
                idea_text: idea.to_string(),
                feasibility_score: score,
                analysis_summary: summary,
                search_results: Vec::new(),
                success: true,
                error: Some(format!("search unavailable, basic analysis used: {reason}")),
            };
        }

        let user_query = context.and_then(extract_user_query);
        let score = self
            .feasibility_score(&response.results, idea, user_query.as_deref())
            .await;
        let summary = analysis_summary(&response.results, score);
        info!(score, "idea verification complete");

        IdeaVerificationReport {
            idea_text: idea.to_string(),
            feasibility_score: score,
            analysis_summary: summary,
            search_results: response.results,
            success: true,
            error: None,
        }
    }

    async fn search_for_verification(&self, idea: &str, context: Option<&Value>) -> SearchResponse {
        let cache_key = verification_cache_key(idea, context);
        if let Some(cached) = self.cache.get(&cache_key) {
            debug!("verification search cache hit");
            return cached;
        }

        let query = self.build_query(idea, context).await;
        debug!(query = %query, "verification search query");
        let response = self.search.search(&query, Some(VERIFICATION_RESULTS)).await;
        if response.success {
            self.cache.put(cache_key, response.clone());
        }
        response
    }

    /// Build the verification query. The user's question is the primary
    /// source; the seed only assists. LLM integration is preferred, the
    /// keyword fallback always works.
    async fn build_query(&self, idea: &str, context: Option<&Value>) -> String {
        let user_query = context.and_then(extract_user_query);

        if let (Some(router), Some(user_query)) = (&self.router, user_query.as_deref()) {
            match self.llm_integrate_query(router, idea, user_query).await {
                Ok(query) if !query.trim().is_empty() => return query.trim().to_string(),
                Ok(_) => warn!("LLM produced an empty verification query"),
                Err(reason) => warn!("LLM query integration failed: {reason}"),
            }
        }

        if let Some(user_query) = user_query.as_deref() {
            return fallback_integrate_query(user_query);
        }

        // No user question available: fall back to the seed prefix,
        // optionally scoped by a concrete domain.
        let mut query = truncate_chars(idea, 50).trim().to_string();
        if let Some(domain) = context.and_then(|c| c.get("domain")).and_then(Value::as_str) {
            if !matches!(domain, "general" | "unknown" | "通用") {
                query = format!("{query} {domain}");
            }
        }
        query
    }

    async fn llm_integrate_query(
        &self,
        router: &LlmRouter,
        idea: &str,
        user_query: &str,
    ) -> Result<String, String> {
        let year = temporal::current_year();
        let date = temporal::current_date();
        let seed_preview = truncate_chars(idea, 200);

        let prompt = format!(
            "Your task is to produce one precise web-search query string.\n\
             \n\
             Important time information:\n\
             - Current year: {year}\n\
             - Current date: {date}\n\
             \n\
             The user's question:\n{user_query}\n\
             \n\
             Suggested thinking angle (reference only):\n{seed_preview}\n\
             \n\
             Rules:\n\
             1. Extract the core topic, key entities, and the concrete question from the \
             user's question.\n\
             2. Never search for abstract methodology vocabulary (\"systematic analysis\", \
             \"feasibility\", \"critical thinking\").\n\
             3. Target facts, data, cases, and tutorials that answer the question directly.\n\
             4. When the question involves \"latest\" or \"current\", the query MUST contain \
             {year}.\n\
             \n\
             Output only the query string, 30 words at most, no quotes, no explanation.\n\
             Search query:"
        );

        let reply = router
            .call(&prompt, None, Some(0.1))
            .await
            .map_err(|e| e.to_string())?;
        let query = reply.lines().next().unwrap_or_default().trim().to_string();
        info!(query = %query, "LLM integrated verification query");
        Ok(query)
    }

    async fn feasibility_score(
        &self,
        results: &[SearchResult],
        idea: &str,
        user_query: Option<&str>,
    ) -> f32 {
        if results.is_empty() {
            return 0.1;
        }
        debug!(
            query_type = ?QueryType::detect(user_query.unwrap_or(idea)),
            "scoring feasibility"
        );

        if let Some(score) = self.llm_semantic_relevance(results, idea, user_query).await {
            info!(score, "LLM semantic relevance score");
            return score.clamp(0.0, 1.0);
        }

        // No LLM: conservative estimate from the evidence volume alone.
        let score = match results.len() {
            n if n >= 5 => 0.6,
            n if n >= 3 => 0.5,
            _ => 0.4,
        };
        warn!(score, "LLM unavailable, using conservative default score");
        score
    }

    /// Three-dimension semantic judgment: relevance 40%, quality 30%,
    /// actionability 30%.
    async fn llm_semantic_relevance(
        &self,
        results: &[SearchResult],
        idea: &str,
        user_query: Option<&str>,
    ) -> Option<f32> {
        let router = self.router.as_ref()?;

        let mut evidence = String::new();
        for (index, result) in results.iter().take(3).enumerate() {
            evidence.push_str(&format!(
                "{}. Title: {}\n   Summary: {}...\n",
                index + 1,
                result.title,
                truncate_chars(&result.snippet, 150)
            ));
        }
        let question = user_query.unwrap_or(idea);
        let idea_preview = truncate_chars(idea, 300);

        let prompt = format!(
            "You are an expert evaluator of information relevance. Rate how well the \
             search results below serve the user's question.\n\
             \n\
             User question:\n{question}\n\
             \n\
             Idea under verification:\n{idea_preview}\n\
             \n\
             Search results:\n{evidence}\n\
             \n\
             Rate each dimension in [0.0, 1.0]:\n\
             1. relevance - do the results answer the question directly?\n\
             2. quality - how detailed, authoritative, and accurate is the content?\n\
             3. actionability - do the results provide usable answers or advice?\n\
             \n\
             Respond with strict JSON only:\n\
             {{\"relevance\": 0.0, \"quality\": 0.0, \"actionability\": 0.0, \
             \"explanation\": \"one or two sentences\"}}"
        );

        let reply = match router.call(&prompt, None, Some(0.1)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("semantic relevance call failed: {e}");
                return None;
            }
        };
        let value = extract_json(&reply)?;
        let relevance = value.get("relevance")?.as_f64()?;
        let quality = value.get("quality")?.as_f64()?;
        let actionability = value.get("actionability")?.as_f64()?;

        if let Some(explanation) = value["explanation"].as_str() {
            debug!(explanation, "judgment rationale");
        }
        Some((relevance * 0.4 + quality * 0.3 + actionability * 0.3) as f32)
    }
}

fn extract_user_query(context: &Value) -> Option<String> {
    for key in ["user_query", "original_query", "query"] {
        if let Some(query) = context.get(key).and_then(Value::as_str) {
            if !query.is_empty() {
                return Some(query.to_string());
            }
        }
    }
    None
}

/// Keyword-based query construction from the user's question, with
/// methodology vocabulary removed and the year appended for
/// time-flagged questions.
fn fallback_integrate_query(user_query: &str) -> String {
    static CORE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"[A-Z][A-Za-z]+|[a-z]+|[\p{Han}]{2,}|\d+").expect("valid pattern")
    });

    let mut cleaned = user_query.to_string();
    for word in METHOD_WORDS {
        cleaned = cleaned.replace(word, " ");
    }
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    let tokens: Vec<&str> = CORE_TOKEN_RE
        .find_iter(&cleaned)
        .map(|m| m.as_str())
        .take(8)
        .collect();
    let mut query = if tokens.len() < 2 {
        truncate_chars(&cleaned, 60).trim().to_string()
    } else {
        tokens.join(" ")
    };

    if temporal::has_time_token(user_query) {
        let year = temporal::current_year().to_string();
        if !query.contains(&year) {
            query = format!("{query} {year}");
        }
    }
    debug!(query = %query, "fallback verification query");
    query
}

/// Text-heuristic feasibility analysis used when search is down.
fn fallback_analysis(idea: &str, error_message: &str) -> (f32, String) {
    const TECH: [&str; 16] = [
        "api", "算法", "数据库", "系统", "架构", "优化", "机器学习", "ml", "ai", "人工智能",
        "深度学习", "网络", "爬虫", "数据分析", "实时", "性能",
    ];
    const POSITIVE: [&str; 11] = [
        "简单", "基础", "标准", "常见", "成熟", "开源", "simple", "basic", "standard", "common",
        "mature",
    ];
    const CHALLENGING: [&str; 10] = [
        "复杂", "高级", "创新", "前沿", "实验", "研究", "complex", "advanced", "innovative",
        "cutting-edge",
    ];

    let lower = idea.to_lowercase();
    let tech = TECH.iter().filter(|k| lower.contains(**k)).count();
    let positive = POSITIVE.iter().filter(|k| lower.contains(**k)).count();
    let challenging = CHALLENGING.iter().filter(|k| lower.contains(**k)).count();

    let mut score: f32 = 0.5;
    if tech > 0 {
        score += 0.1;
    }
    if positive > challenging {
        score += 0.2;
    } else if challenging > positive {
        score -= 0.1;
    }
    let length = char_len(idea);
    if length > 100 {
        score += 0.1;
    } else if length < 50 {
        score -= 0.1;
    }
    let score = score.clamp(0.1, 0.9);

    let mut summary = format!(
        "Text-based analysis of \"{}\": ",
        truncate_chars(idea, 50)
    );
    summary.push_str(if score >= 0.7 {
        "the idea shows good feasibility"
    } else if score >= 0.5 {
        "the idea shows moderate feasibility"
    } else {
        "the idea's feasibility looks limited"
    });
    if tech > 2 {
        summary.push_str(", involving several technical elements");
    } else if tech > 0 {
        summary.push_str(", involving technical implementation elements");
    }
    if challenging > positive {
        summary.push_str(", with notable implementation difficulty");
    } else if positive > 0 {
        summary.push_str(", with a relatively straightforward implementation");
    }
    summary.push_str(". Search was unavailable, so this analysis rests on the text alone");
    let lower_err = error_message.to_lowercase();
    if lower_err.contains("rate") || lower_err.contains("limit") {
        summary.push_str("; retry later for an evidence-backed verification.");
    } else {
        summary.push_str("; check connectivity and retry for an evidence-backed verification.");
    }
    (score, summary)
}

/// Score-banded human summary of the verification outcome.
fn analysis_summary(results: &[SearchResult], score: f32) -> String {
    if results.is_empty() {
        return "No relevant information found; feasibility analysis is limited.".to_string();
    }

    let assessment = if score >= 0.8 {
        "The idea shows very high feasibility"
    } else if score >= 0.6 {
        "The idea shows good feasibility"
    } else if score >= 0.4 {
        "The idea shows some feasibility but deserves a careful look"
    } else if score >= 0.2 {
        "The idea's feasibility is low, with significant challenges"
    } else {
        "The idea's feasibility is very low"
    };

    let detailed = results.iter().filter(|r| r.snippet.len() > 50).count();
    let coverage = if detailed * 10 >= results.len() * 6 {
        "detailed supporting material was found"
    } else {
        "supporting material is limited"
    };

    format!(
        "{assessment}. Analysis drew on {} relevant results; {coverage}. \
         Overall feasibility score: {score:.1}/1.0.",
        results.len()
    )
}

fn verification_cache_key(idea: &str, context: Option<&Value>) -> String {
    let mut hasher = DefaultHasher::new();
    idea.hash(&mut hasher);
    context.map(|c| c.to_string()).unwrap_or_default().hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
