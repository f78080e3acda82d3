//! Tool registry capability.
//!
//! The seed verifier consumes tools through this narrow interface; the
//! built-in registry wires the crate's own search client and idea
//! verifier behind the required tool names.

use crate::core::search::WebSearchClient;
use crate::core::verification::IdeaVerifier;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

/// Tool name for evidence search.
pub const WEB_SEARCH_TOOL: &str = "web_search";
/// Tool name for idea feasibility verification.
pub const IDEA_VERIFICATION_TOOL: &str = "idea_verification";

/// Uniform tool invocation result.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub data: Value,
    pub metadata: Value,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            metadata: json!({}),
            error: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            metadata: json!({}),
            error: Some(message.into()),
        }
    }
}

/// Registry of named tools available to the verifier.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    fn has_tool(&self, name: &str) -> bool;

    /// Execute a tool by name. Failures are reported in the output,
    /// never raised.
    async fn execute_tool(&self, name: &str, args: Value) -> ToolOutput;
}

/// Built-in registry exposing `web_search` and `idea_verification`.
pub struct BuiltinToolRegistry {
    search: Arc<WebSearchClient>,
    verifier: Arc<IdeaVerifier>,
}

impl BuiltinToolRegistry {
    pub fn new(search: Arc<WebSearchClient>, verifier: Arc<IdeaVerifier>) -> Self {
        Self { search, verifier }
    }
}

#[async_trait]
impl ToolRegistry for BuiltinToolRegistry {
    fn has_tool(&self, name: &str) -> bool {
        matches!(name, WEB_SEARCH_TOOL | IDEA_VERIFICATION_TOOL)
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolOutput {
        match name {
            WEB_SEARCH_TOOL => {
                let Some(query) = args.get("query").and_then(Value::as_str) else {
                    return ToolOutput::failure("web_search requires a 'query' argument");
                };
                let max_results = args
                    .get("max_results")
                    .and_then(Value::as_u64)
                    .map(|n| n as usize);
                let response = self.search.search(query, max_results).await;
                if response.success {
                    let metadata = response.metadata.clone().unwrap_or_else(|| json!({}));
                    ToolOutput::ok(json!({
                        "query": response.query,
                        "results": response.results,
                    }))
                    .with_metadata(metadata)
                } else {
                    ToolOutput::failure(
                        response
                            .error
                            .map(|e| e.message)
                            .unwrap_or_else(|| "search failed".to_string()),
                    )
                }
            }
            IDEA_VERIFICATION_TOOL => {
                let Some(idea) = args.get("idea_text").and_then(Value::as_str) else {
                    return ToolOutput::failure(
                        "idea_verification requires an 'idea_text' argument",
                    );
                };
                let context = args.get("context");
                let report = self.verifier.verify_idea(idea, context).await;
                let mut output = ToolOutput::ok(json!({
                    "feasibility_score": report.feasibility_score,
                    "verification_passed": true,
                    "key_findings": [report.analysis_summary],
                    "search_results": report.search_results,
                }));
                output.success = report.success;
                output.error = report.error;
                output
            }
            other => {
                warn!(tool = other, "unknown tool requested");
                ToolOutput::failure(format!("unknown tool '{other}'"))
            }
        }
    }
}
