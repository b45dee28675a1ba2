//! Schema Cache (C6, spec.md §4.6) — per-MCP configuration-schema snapshot,
//! used by add/repair flows out of scope here. Read-heavy, non-critical if
//! missing: callers should treat a missing or corrupt entry as "no prior
//! schema observed", not an error.

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use serde_json::Value;

use crate::cache::csv_cache::atomic_write_json;
use crate::paths::NcpPaths;
use crate::paths::sanitize_name;

pub struct SchemaCache<'a> {
    paths: &'a NcpPaths,
}

impl<'a> SchemaCache<'a> {
    pub fn new(paths: &'a NcpPaths) -> Self {
        Self { paths }
    }

    fn file_for(&self, mcp: &str) -> PathBuf {
        self.paths.schema_cache_file(&sanitize_name(mcp))
    }

    pub fn load(&self, mcp: &str) -> Option<Value> {
        let path = self.file_for(mcp);
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn store(&self, mcp: &str, schema: &Value) -> Result<()> {
        let path = self.file_for(mcp);
        atomic_write_json(&path, schema).with_context(|| format!("storing schema cache for {mcp}"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn missing_schema_returns_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let cache = SchemaCache::new(&paths);
        assert!(cache.load("nonexistent").is_none());
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let cache = SchemaCache::new(&paths);
        let schema = serde_json::json!({"type": "object"});
        cache.store("fs", &schema).unwrap();
        assert_eq!(cache.load("fs"), Some(schema));
    }
}
