//! The `DiscoveryEngine` contract (spec.md §1: "treated as a black-box
//! `DiscoveryEngine` with a 3-method contract"). The real implementation is a
//! semantic vector-search engine out of scope for this crate; NCP ships a
//! non-authoritative default built on `nucleo-matcher`'s fuzzy scoring so the
//! crate is usable standalone.

use std::sync::Mutex;

use async_trait::async_trait;
use mcp_types::Tool;
use nucleo_matcher::Config;
use nucleo_matcher::Matcher;
use nucleo_matcher::pattern::CaseMatching;
use nucleo_matcher::pattern::Normalization;
use nucleo_matcher::pattern::Pattern;

#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    pub prefixed_name: String,
    pub mcp_name: String,
    pub tool_name: String,
    pub description: String,
    pub confidence: f64,
}

/// Three operations: index fresh tools (embeddings would be regenerated by a
/// real engine), index tools already known from a valid cache load (MUST NOT
/// regenerate embeddings, per spec.md §4.9), and search.
#[async_trait]
pub trait DiscoveryEngine: Send + Sync {
    async fn index_mcp_tools(&self, mcp: &str, tools: &[Tool]);
    async fn index_mcp_tools_from_cache(&self, mcp: &str, tools: &[Tool]);
    async fn search(&self, query: &str, limit: usize) -> Vec<DiscoveryResult>;
}

struct IndexedTool {
    mcp_name: String,
    tool_name: String,
    description: String,
}

#[derive(Default)]
pub struct NucleoDiscoveryEngine {
    tools: Mutex<Vec<IndexedTool>>,
}

impl NucleoDiscoveryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn replace_mcp(&self, mcp: &str, tools: &[Tool]) {
        let mut guard = self.tools.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.retain(|t| t.mcp_name != mcp);
        guard.extend(tools.iter().map(|tool| IndexedTool {
            mcp_name: mcp.to_string(),
            tool_name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
        }));
    }
}

#[async_trait]
impl DiscoveryEngine for NucleoDiscoveryEngine {
    async fn index_mcp_tools(&self, mcp: &str, tools: &[Tool]) {
        self.replace_mcp(mcp, tools);
    }

    async fn index_mcp_tools_from_cache(&self, mcp: &str, tools: &[Tool]) {
        // Same storage path; the distinction matters only to a real
        // embeddings-backed engine that would otherwise recompute vectors.
        self.replace_mcp(mcp, tools);
    }

    async fn search(&self, query: &str, limit: usize) -> Vec<DiscoveryResult> {
        let guard = self.tools.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if query.trim().is_empty() {
            return guard
                .iter()
                .take(limit)
                .map(|t| to_result(t, 1.0))
                .collect();
        }

        let mut matcher = Matcher::new(Config::DEFAULT);
        let pattern = Pattern::parse(query, CaseMatching::Ignore, Normalization::Smart);
        let mut scored: Vec<(f64, &IndexedTool)> = guard
            .iter()
            .filter_map(|tool| {
                let haystack = format!("{} {}", tool.tool_name, tool.description);
                let score = pattern.score(
                    nucleo_matcher::Utf32Str::new(&haystack, &mut Vec::new()).slice(..),
                    &mut matcher,
                )?;
                Some((score as f64 / u16::MAX as f64, tool))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(limit)
            .map(|(score, tool)| to_result(tool, score.clamp(0.0, 1.0)))
            .collect()
    }
}

fn to_result(tool: &IndexedTool, confidence: f64) -> DiscoveryResult {
    DiscoveryResult {
        prefixed_name: format!("{}:{}", tool.mcp_name, tool.tool_name),
        mcp_name: tool.mcp_name.clone(),
        tool_name: tool.tool_name.clone(),
        description: tool.description.clone(),
        confidence,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn tool(name: &str, description: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: mcp_types::ToolInputSchema {
                r#type: "object".to_string(),
                properties: None,
                required: None,
            },
            output_schema: None,
            title: None,
            annotations: None,
        }
    }

    #[tokio::test]
    async fn empty_query_returns_first_n_with_full_confidence() {
        let engine = NucleoDiscoveryEngine::new();
        engine
            .index_mcp_tools("fs", &[tool("read", "read a file"), tool("write", "write a file")])
            .await;
        let results = engine.search("", 1).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn fuzzy_query_matches_substring() {
        let engine = NucleoDiscoveryEngine::new();
        engine
            .index_mcp_tools("fs", &[tool("read", "read a file"), tool("deploy", "deploy a service")])
            .await;
        let results = engine.search("read", 5).await;
        assert!(results.iter().any(|r| r.tool_name == "read"));
    }
}
