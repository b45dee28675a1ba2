//! On-disk layout helpers (spec.md §6). Everything lives under a
//! configurable base directory, default `~/.ncp/`.

use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct NcpPaths {
    base: PathBuf,
}

impl NcpPaths {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    /// Resolves the base directory from `$NCP_HOME` or `~/.ncp`.
    pub fn discover() -> Self {
        let base = std::env::var_os("NCP_HOME")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".ncp")))
            .unwrap_or_else(|| PathBuf::from(".ncp"));
        Self::new(base)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn profile_path(&self, profile: &str) -> PathBuf {
        self.base.join("profiles").join(format!("{profile}.json"))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.base.join("cache")
    }

    pub fn tools_csv(&self, profile: &str) -> PathBuf {
        self.cache_dir().join(format!("{profile}-tools.csv"))
    }

    pub fn cache_meta(&self, profile: &str) -> PathBuf {
        self.cache_dir().join(format!("{profile}-cache-meta.json"))
    }

    pub fn all_tools_json(&self) -> PathBuf {
        self.cache_dir().join("all-tools.json")
    }

    pub fn embeddings_json(&self) -> PathBuf {
        self.cache_dir().join("embeddings.json")
    }

    pub fn schema_cache_dir(&self) -> PathBuf {
        self.cache_dir().join("schemas")
    }

    pub fn schema_cache_file(&self, sanitized_mcp_name: &str) -> PathBuf {
        self.schema_cache_dir()
            .join(format!("{sanitized_mcp_name}.schema.json"))
    }

    pub fn scheduler_dir(&self) -> PathBuf {
        self.base.join("scheduler")
    }

    pub fn tasks_json(&self) -> PathBuf {
        self.scheduler_dir().join("tasks.json")
    }

    pub fn timings_json(&self) -> PathBuf {
        self.scheduler_dir().join("timings.json")
    }

    pub fn executions_dir(&self) -> PathBuf {
        self.scheduler_dir().join("executions")
    }

    pub fn executions_summary_csv(&self) -> PathBuf {
        self.executions_dir().join("summary.csv")
    }

    pub fn execution_result_json(&self, execution_id: &str) -> PathBuf {
        self.executions_dir()
            .join("results")
            .join(format!("{execution_id}.json"))
    }
}

/// Replaces any character outside `[a-zA-Z0-9_-]` with `_`, for filenames
/// derived from user-controlled MCP names.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        "_".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn sanitizes_path_hostile_characters() {
        assert_eq!(sanitize_name("weird/name:x"), "weird_name_x");
    }

    #[test]
    fn layout_matches_documented_paths() {
        let paths = NcpPaths::new(PathBuf::from("/tmp/ncp-home"));
        assert_eq!(
            paths.tools_csv("default"),
            PathBuf::from("/tmp/ncp-home/cache/default-tools.csv")
        );
        assert_eq!(
            paths.executions_summary_csv(),
            PathBuf::from("/tmp/ncp-home/scheduler/executions/summary.csv")
        );
    }
}
