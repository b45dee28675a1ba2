//! Version-Aware Validator (C7, spec.md §4.7). Pure comparison logic, no I/O:
//! callers pass in the cached and live versions and get back the subset of
//! MCPs needing a refresh.

use std::collections::HashMap;

/// Cached metadata reports `"unknown"` for caches written before NCP tracked
/// server versions; those are skipped rather than treated as always-stale.
const UNVERSIONED: &str = "unknown";

/// Compares `cached[mcp]` against `live[mcp]` and returns the MCPs whose
/// version changed. MCPs present only in `cached` or only in `live` are
/// ignored — this validator only flags refreshes for currently connected
/// MCPs with prior cache entries.
pub fn mcps_needing_refresh(
    cached: &HashMap<String, String>,
    live: &HashMap<String, String>,
) -> Vec<String> {
    let mut stale: Vec<String> = live
        .iter()
        .filter_map(|(mcp, live_version)| {
            let cached_version = cached.get(mcp)?;
            if cached_version == UNVERSIONED {
                return None;
            }
            if cached_version != live_version {
                Some(mcp.clone())
            } else {
                None
            }
        })
        .collect();
    stale.sort();
    stale
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn flags_mcps_with_changed_versions() {
        let cached = HashMap::from([
            ("fs".to_string(), "1.0.0".to_string()),
            ("web".to_string(), "2.0.0".to_string()),
        ]);
        let live = HashMap::from([
            ("fs".to_string(), "1.1.0".to_string()),
            ("web".to_string(), "2.0.0".to_string()),
        ]);
        assert_eq!(mcps_needing_refresh(&cached, &live), vec!["fs".to_string()]);
    }

    #[test]
    fn skips_unknown_cached_version() {
        let cached = HashMap::from([("fs".to_string(), "unknown".to_string())]);
        let live = HashMap::from([("fs".to_string(), "1.1.0".to_string())]);
        assert!(mcps_needing_refresh(&cached, &live).is_empty());
    }
}
