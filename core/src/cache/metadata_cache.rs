//! Metadata Cache (C5, spec.md §4.5) — full tool schemas the CSV drops for
//! size, keyed by MCP name. Every mutation goes through `tmp+fsync+rename` so
//! a concurrent reader sees either the pre- or post-state, never a
//! truncated file.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use mcp_types::Implementation;
use mcp_types::Tool;
use serde::Deserialize;
use serde::Serialize;

use crate::cache::csv_cache::atomic_write_json;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpMetadata {
    pub tools: Vec<Tool>,
    pub server_info: Option<Implementation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataSnapshot {
    profile_hash: String,
    mcps: HashMap<String, McpMetadata>,
}

pub struct MetadataCache {
    path: PathBuf,
    snapshot: MetadataSnapshot,
}

impl MetadataCache {
    pub fn load(path: PathBuf) -> Result<Self> {
        let snapshot = if path.exists() {
            let raw = std::fs::read_to_string(&path).context("reading metadata cache")?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            MetadataSnapshot::default()
        };
        Ok(Self { path, snapshot })
    }

    pub fn get(&self, mcp: &str) -> Option<&McpMetadata> {
        self.snapshot.mcps.get(mcp)
    }

    pub fn update_profile_hash(&mut self, hash: &str) -> Result<()> {
        self.snapshot.profile_hash = hash.to_string();
        self.persist()
    }

    pub fn patch_add_mcp(&mut self, mcp: &str, metadata: McpMetadata) -> Result<()> {
        self.snapshot.mcps.insert(mcp.to_string(), metadata);
        self.persist()
    }

    pub fn patch_update_mcp(&mut self, mcp: &str, metadata: McpMetadata) -> Result<()> {
        self.patch_add_mcp(mcp, metadata)
    }

    pub fn patch_remove_mcp(&mut self, mcp: &str) -> Result<()> {
        self.snapshot.mcps.remove(mcp);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        atomic_write_json(&self.path, &self.snapshot)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn add_then_remove_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all-tools.json");
        let mut cache = MetadataCache::load(path.clone()).unwrap();
        let metadata = McpMetadata {
            tools: Vec::new(),
            server_info: None,
        };
        cache.patch_add_mcp("fs", metadata.clone()).unwrap();
        cache.patch_add_mcp("fs", metadata).unwrap();
        let reloaded = MetadataCache::load(path).unwrap();
        assert!(reloaded.get("fs").is_some());
    }

    #[test]
    fn remove_then_reload_drops_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all-tools.json");
        let mut cache = MetadataCache::load(path.clone()).unwrap();
        cache
            .patch_add_mcp(
                "fs",
                McpMetadata {
                    tools: Vec::new(),
                    server_info: None,
                },
            )
            .unwrap();
        cache.patch_remove_mcp("fs").unwrap();
        let reloaded = MetadataCache::load(path).unwrap();
        assert!(reloaded.get("fs").is_none());
    }
}
