//! Deterministic term-frequency boost applied to raw `DiscoveryEngine`
//! results (spec.md §4.10.1). Constants are preserved literally from the
//! specification for result parity (see DESIGN.md's Open Question note);
//! do not tune without a regression test.

const BASE_WEIGHT_NAME: f64 = 0.15;
const BASE_WEIGHT_DESC: f64 = 0.075;
const SEMANTIC_MULTIPLIER: f64 = 1.2;
const DIMINISHING_FACTOR: f64 = 0.8;
const MIN_TOKEN_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Action,
    Resource,
    Modifier,
}

/// The `SearchEnhancer` collaborator (spec.md §4.10.1): classifies query
/// tokens and supplies semantic synonyms / conflicting-intent penalties. Out
/// of scope for this crate's own search quality; NCP ships a minimal
/// implementation so `find` is self-contained without an external service.
pub trait SearchEnhancer: Send + Sync {
    fn classify(&self, token: &str) -> TokenClass;
    fn action_semantics(&self, token: &str) -> Vec<String>;
    fn intent_penalty(&self, token: &str, name: &str, description: &str) -> f64;
}

/// A conservative default: every token is a `Resource` (name/description
/// substring boost only, no synonyms, no penalty) unless it matches one of a
/// small built-in verb list.
pub struct DefaultSearchEnhancer;

const BUILTIN_ACTIONS: &[(&str, &[&str])] = &[
    ("read", &["get", "fetch", "load"]),
    ("write", &["save", "put", "store"]),
    ("delete", &["remove", "drop", "unlink"]),
    ("create", &["add", "new", "make"]),
    ("list", &["enumerate", "show"]),
    ("search", &["find", "query", "lookup"]),
];

impl SearchEnhancer for DefaultSearchEnhancer {
    fn classify(&self, token: &str) -> TokenClass {
        if BUILTIN_ACTIONS.iter().any(|(verb, _)| *verb == token) {
            TokenClass::Action
        } else {
            TokenClass::Resource
        }
    }

    fn action_semantics(&self, token: &str) -> Vec<String> {
        BUILTIN_ACTIONS
            .iter()
            .find(|(verb, _)| *verb == token)
            .map(|(_, synonyms)| synonyms.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default()
    }

    fn intent_penalty(&self, _token: &str, _name: &str, _description: &str) -> f64 {
        0.0
    }
}

pub struct RawResult {
    pub name: String,
    pub description: String,
    pub base_confidence: f64,
}

pub struct BoostedResult {
    pub name: String,
    pub description: String,
    pub confidence: f64,
}

/// Applies the deterministic boost described in spec.md §4.10.1 to each raw
/// result for `query`.
pub fn apply_term_frequency_boost(
    results: Vec<RawResult>,
    query: &str,
    enhancer: &dyn SearchEnhancer,
) -> Vec<BoostedResult> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .collect();

    results
        .into_iter()
        .map(|result| {
            let name_lower = result.name.to_lowercase();
            let desc_lower = result.description.to_lowercase();
            let mut raw_name_boost = 0.0;
            let mut raw_desc_boost = 0.0;

            for token in &tokens {
                if name_lower.contains(token.as_str()) {
                    raw_name_boost += BASE_WEIGHT_NAME;
                }
                if desc_lower.contains(token.as_str()) {
                    raw_desc_boost += BASE_WEIGHT_DESC;
                }

                if enhancer.classify(token) == TokenClass::Action {
                    for synonym in enhancer.action_semantics(token) {
                        if name_lower.contains(&synonym) {
                            raw_name_boost += BASE_WEIGHT_NAME * SEMANTIC_MULTIPLIER;
                        }
                        if desc_lower.contains(&synonym) {
                            raw_desc_boost += BASE_WEIGHT_DESC * SEMANTIC_MULTIPLIER;
                        }
                    }
                    let penalty = enhancer.intent_penalty(token, &name_lower, &desc_lower);
                    raw_name_boost -= penalty;
                }
            }

            let final_name_boost = diminishing_returns(raw_name_boost, BASE_WEIGHT_NAME);
            let final_desc_boost = diminishing_returns(raw_desc_boost, BASE_WEIGHT_DESC);
            let confidence =
                result.base_confidence * (1.0 + final_name_boost + final_desc_boost);

            BoostedResult {
                name: result.name,
                description: result.description,
                confidence,
            }
        })
        .collect()
}

fn diminishing_returns(raw_boost: f64, base_weight: f64) -> f64 {
    if raw_boost <= 0.0 {
        return raw_boost;
    }
    let excess = (raw_boost / base_weight - 1.0).max(0.0);
    raw_boost * DIMINISHING_FACTOR.powf(excess)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn no_matching_tokens_leaves_confidence_unchanged() {
        let results = vec![RawResult {
            name: "write_file".to_string(),
            description: "writes a file to disk".to_string(),
            base_confidence: 0.5,
        }];
        let boosted =
            apply_term_frequency_boost(results, "zzz", &DefaultSearchEnhancer);
        assert_eq!(boosted[0].confidence, 0.5);
    }

    #[test]
    fn matching_name_token_increases_confidence() {
        let results = vec![RawResult {
            name: "write_file".to_string(),
            description: "persist bytes".to_string(),
            base_confidence: 0.5,
        }];
        let boosted =
            apply_term_frequency_boost(results, "write", &DefaultSearchEnhancer);
        assert!(boosted[0].confidence > 0.5);
    }

    #[test]
    fn tokens_shorter_than_three_chars_are_ignored() {
        let results = vec![RawResult {
            name: "ls".to_string(),
            description: "list files".to_string(),
            base_confidence: 0.5,
        }];
        let boosted = apply_term_frequency_boost(results, "ls", &DefaultSearchEnhancer);
        assert_eq!(boosted[0].confidence, 0.5);
    }
}
