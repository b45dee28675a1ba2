//! The three derived structures kept in lockstep (spec.md §3's `ToolIndex`)
//! plus the per-resource State Manager that guards their mutation
//! (spec.md §4.10.3).

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use mcp_types::Implementation;
use mcp_types::Tool;
use tokio::sync::Mutex;
use tokio::sync::RwLock;

use crate::config_types::McpServerConfig;
use crate::config_types::McpServerTransportConfig;
use crate::pool::ConnectTarget;

#[derive(Debug, Clone)]
pub struct MCPDefinition {
    pub name: String,
    pub config: McpServerConfig,
    pub tools: Vec<Tool>,
    pub server_info: Option<Implementation>,
}

#[derive(Debug, Clone)]
pub struct AllToolsEntry {
    pub prefixed_name: String,
    pub description: String,
    pub mcp_name: String,
}

/// A reusable prompt template registered with the `skills` internal MCP
/// (spec.md §4.10.3's "skill"). Lifecycle mutations go through
/// [`SharedIndex::mutate_atomically`] the same as any other resource the
/// State Manager guards.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SkillPrompt {
    pub name: String,
    pub description: String,
    pub prompt: String,
}

#[derive(Debug, Default)]
pub struct ToolIndexState {
    pub definitions: HashMap<String, MCPDefinition>,
    pub all_tools: Vec<AllToolsEntry>,
    /// Both the bare tool name and the `mcp:tool` form map to the owning
    /// MCP; spec.md §3 requires both forms to route identically. A bare
    /// name present in more than one MCP maps to whichever MCP registered
    /// it last — callers should prefer the qualified form when ambiguous.
    pub tool_to_mcp: HashMap<String, String>,
    pub skill_prompts: HashMap<String, SkillPrompt>,
}

impl ToolIndexState {
    fn remove_mcp(&mut self, mcp: &str) {
        self.definitions.remove(mcp);
        self.all_tools.retain(|entry| entry.mcp_name != mcp);
        self.tool_to_mcp.retain(|_, owner| owner != mcp);
    }

    fn insert_mcp(&mut self, definition: MCPDefinition) {
        let mcp = definition.name.clone();
        self.remove_mcp(&mcp);
        for tool in &definition.tools {
            let prefixed = format!("{mcp}:{}", tool.name);
            self.all_tools.push(AllToolsEntry {
                prefixed_name: prefixed.clone(),
                description: tool.description.clone().unwrap_or_default(),
                mcp_name: mcp.clone(),
            });
            self.tool_to_mcp.insert(tool.name.clone(), mcp.clone());
            self.tool_to_mcp.insert(prefixed, mcp.clone());
        }
        self.definitions.insert(mcp, definition);
    }
}

/// Shared between the orchestrator and the connection pool. The pool only
/// ever reads `transport_config`; it never calls back into orchestrator
/// logic, preserving the one-way ownership spec.md §9 requires.
pub struct SharedIndex {
    state: RwLock<ToolIndexState>,
    resource_locks: Mutex<HashSet<(String, String)>>,
}

impl Default for SharedIndex {
    fn default() -> Self {
        Self {
            state: RwLock::new(ToolIndexState::default()),
            resource_locks: Mutex::new(HashSet::new()),
        }
    }
}

impl SharedIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, ToolIndexState> {
        self.state.read().await
    }

    /// Runs `mutate` under the per-`{kind, name}` lock spec.md §4.10.3
    /// requires: snapshot, mutate, and on error restore the snapshot before
    /// releasing the lock.
    pub async fn mutate_atomically<F>(&self, kind: &str, name: &str, mutate: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut ToolIndexState) -> anyhow::Result<()>,
    {
        let key = (kind.to_string(), name.to_string());
        loop {
            let mut locks = self.resource_locks.lock().await;
            if !locks.contains(&key) {
                locks.insert(key.clone());
                break;
            }
            drop(locks);
            tokio::task::yield_now().await;
        }

        let mut state = self.state.write().await;
        let snapshot = clone_state(&state);
        let result = mutate(&mut state);
        if result.is_err() {
            *state = snapshot;
            tracing::warn!(kind, name, "state:restored");
        }
        drop(state);

        self.resource_locks.lock().await.remove(&key);
        result
    }

    pub async fn insert_mcp(&self, definition: MCPDefinition) {
        self.state.write().await.insert_mcp(definition);
    }

    pub async fn remove_mcp(&self, mcp: &str) {
        self.state.write().await.remove_mcp(mcp);
    }
}

fn clone_state(state: &ToolIndexState) -> ToolIndexState {
    ToolIndexState {
        definitions: state.definitions.clone(),
        all_tools: state.all_tools.clone(),
        tool_to_mcp: state.tool_to_mcp.clone(),
        skill_prompts: state.skill_prompts.clone(),
    }
}

#[async_trait::async_trait]
impl ConnectTarget for SharedIndex {
    async fn transport_config(&self, mcp: &str) -> Option<McpServerTransportConfig> {
        let state = self.state.read().await;
        state
            .definitions
            .get(mcp)
            .and_then(|def| def.config.resolve().ok())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use mcp_types::ToolInputSchema;

    fn tool(name: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: Some(format!("{name} tool")),
            input_schema: ToolInputSchema {
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
    async fn insert_mcp_keeps_both_name_forms_in_lockstep() {
        let index = SharedIndex::new();
        index
            .insert_mcp(MCPDefinition {
                name: "fs".to_string(),
                config: McpServerConfig {
                    command: Some("echo-tools".to_string()),
                    args: Vec::new(),
                    env: Default::default(),
                    url: None,
                    transport: None,
                    session_id: None,
                    auth: None,
                },
                tools: vec![tool("read")],
                server_info: None,
            })
            .await;
        let state = index.read().await;
        assert_eq!(state.tool_to_mcp.get("read"), Some(&"fs".to_string()));
        assert_eq!(state.tool_to_mcp.get("fs:read"), Some(&"fs".to_string()));
        assert_eq!(state.all_tools.len(), 1);
    }
}
