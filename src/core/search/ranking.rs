//! Result deduplication and keyword ranking.
//!
//! Canonical dedup key is the URL; the ordering key weighs primary
//! keyword hits double over secondary ones, over title+snippet,
//! case-insensitively. Ties keep insertion order.

use crate::core::types::{SearchResult, SearchStrategy};
use std::collections::HashSet;

/// Drop results whose URL was already seen, preserving order.
pub fn dedup_by_url(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = HashSet::with_capacity(results.len());
    results
        .into_iter()
        .filter(|result| seen.insert(result.url.clone()))
        .collect()
}

/// `2 * primary hits + 1 * secondary hits` over title+snippet.
pub fn keyword_score(result: &SearchResult, strategy: &SearchStrategy) -> u32 {
    let text = format!("{} {}", result.title, result.snippet).to_lowercase();
    let mut score = 0;
    for keyword in &strategy.primary_keywords {
        if !keyword.is_empty() && text.contains(&keyword.to_lowercase()) {
            score += 2;
        }
    }
    for keyword in &strategy.secondary_keywords {
        if !keyword.is_empty() && text.contains(&keyword.to_lowercase()) {
            score += 1;
        }
    }
    score
}

/// Dedup, rank by keyword score (stable), keep the top `cap`.
pub fn rank_and_trim(
    results: Vec<SearchResult>,
    strategy: &SearchStrategy,
    cap: usize,
) -> Vec<SearchResult> {
    let mut unique = dedup_by_url(results);
    unique.sort_by_key(|result| std::cmp::Reverse(keyword_score(result, strategy)));
    unique.truncate(cap);
    unique
}
