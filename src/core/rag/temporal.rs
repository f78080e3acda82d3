//! Temporal correction of generated queries.
//!
//! LLM training data leaks stale years into search keywords. Every
//! query that leaves the pipeline passes through here: wrong years are
//! replaced and time-flagged queries without a year get the current one
//! injected right after the time token.

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Tokens marking a query as time-sensitive.
pub const TIME_TOKENS: [&str; 10] = [
    "最新", "当前", "今年", "现在", "最近", "latest", "current", "recent", "new", "trend",
];

static TIME_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new("(?i)(最新|当前|今年|现在|最近|latest|current|recent|new|trend)")
        .expect("time token pattern is valid")
});

static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(20\d{2})(年?)").expect("year pattern is valid"));

/// Year at the call site's wall clock.
pub fn current_year() -> i32 {
    chrono::Local::now().year()
}

/// Current date rendered for prompt headers.
pub fn current_date() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Whether the text mentions recency in any supported language.
pub fn has_time_token(text: &str) -> bool {
    TIME_TOKEN_RE.is_match(text)
}

/// Whether the text carries a four-digit 20xx year.
pub fn has_year(text: &str) -> bool {
    YEAR_RE.is_match(text)
}

/// Replace wrong years and inject the current one into time-flagged
/// queries that lack it.
pub fn correct_query_year(query: &str, year: i32) -> String {
    let year_str = year.to_string();

    // Wrong 4-digit years are replaced in place, keeping the 年 suffix.
    let mut corrected = YEAR_RE
        .replace_all(query, |caps: &regex::Captures<'_>| {
            let found = &caps[1];
            if found == year_str {
                caps[0].to_string()
            } else {
                warn!(found, expected = %year_str, "replacing stale year in query");
                format!("{year_str}{}", &caps[2])
            }
        })
        .into_owned();

    // Time-flagged but yearless: inject after the first time token.
    if !has_year(&corrected) {
        if let Some(found) = TIME_TOKEN_RE.find(&corrected) {
            let injected = if found.as_str().is_ascii() {
                format!(" {year_str}")
            } else {
                format!(" {year_str}年")
            };
            corrected.insert_str(found.end(), &injected);
            debug!(query = %corrected, "injected current year into time-flagged query");
        }
    }
    corrected
}

/// Final defense applied to a whole query batch before dispatch.
pub fn correct_queries(queries: Vec<String>, year: i32) -> Vec<String> {
    queries
        .into_iter()
        .map(|query| correct_query_year(&query, year))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_time_tokens_in_both_languages() {
        assert!(has_time_token("Python 最新特性"));
        assert!(has_time_token("LATEST rust releases"));
        assert!(has_time_token("market trend analysis"));
        assert!(!has_time_token("history of unix"));
    }

    #[test]
    fn replaces_stale_years() {
        let fixed = correct_query_year("Python 2023 features", 2025);
        assert!(fixed.contains("2025"));
        assert!(!fixed.contains("2023"));

        let fixed_cjk = correct_query_year("人工智能 2023年 发展", 2025);
        assert!(fixed_cjk.contains("2025年"));
        assert!(!fixed_cjk.contains("2023"));
    }

    #[test]
    fn keeps_the_correct_year_untouched() {
        let fixed = correct_query_year("Python 2025 features", 2025);
        assert_eq!(fixed, "Python 2025 features");
    }

    #[test]
    fn injects_year_after_the_time_token() {
        let fixed = correct_query_year("latest rust releases", 2025);
        assert!(fixed.starts_with("latest 2025"));

        let fixed_cjk = correct_query_year("Python 最新特性", 2025);
        assert!(fixed_cjk.contains("最新 2025年"));
    }

    #[test]
    fn yearless_query_without_time_tokens_is_unchanged() {
        let fixed = correct_query_year("unix process model", 2025);
        assert_eq!(fixed, "unix process model");
    }

    #[test]
    fn batch_correction_leaves_no_stale_years() {
        let queries = vec![
            "latest frameworks 2024".to_string(),
            "当前 行业现状".to_string(),
            "plain query".to_string(),
        ];
        for query in correct_queries(queries, 2025) {
            if has_year(&query) {
                assert!(query.contains("2025"));
                assert!(!query.contains("2024"));
            }
        }
    }
}
