//! The Orchestrator (C10, spec.md §4.10) — the top-level state this crate
//! assembles everything else under: definitions, the tool→MCP index,
//! `allTools`, and the small set of top-level operations (`find`, `run`,
//! `readResource`) a calling MCP client actually sees. Grounded on the
//! teacher's top-level session-state shape: one struct owns every
//! sub-service and exposes a small public surface, injecting shared state
//! into internal handlers via an explicit context rather than storing it on
//! the handler (spec.md §9).

mod boost;
mod internal;
mod state;

pub use boost::BoostedResult;
pub use boost::DefaultSearchEnhancer;
pub use boost::RawResult;
pub use boost::SearchEnhancer;
pub use boost::apply_term_frequency_boost;
pub use internal::InternalMcpContext;
pub use internal::dispatch_internal_tool;
pub use internal::is_internal_mcp;
pub use state::AllToolsEntry;
pub use state::MCPDefinition;
pub use state::SharedIndex;
pub use state::SkillPrompt;
pub use state::ToolIndexState;

use std::sync::Arc;
use std::time::Duration;

use mcp_types::ContentBlock;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;
use tracing::warn;

use crate::cache::CsvCache;
use crate::cache::MetadataCache;
use crate::cache::csv_cache::CsvToolRow;
use crate::cache::metadata_cache::McpMetadata;
use crate::config_types::Profile;
use crate::config_types::config_hash;
use crate::config_types::profile_hash;
use crate::discovery::DiscoveryEngine;
use crate::discovery::NucleoDiscoveryEngine;
use crate::discovery::ProbeTarget;
use crate::discovery::index_profile;
use crate::error::NcpError;
use crate::health::HealthMonitor;
use crate::paths::NcpPaths;
use crate::pool::ConnectionPool;
use crate::pool::PoolConfig;
use crate::profile::load_profile;
use crate::scheduler::CronManager;
use crate::scheduler::TaskManager;

const DEFAULT_FIND_LIMIT: usize = 5;
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.35;
const CALL_TOOL_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for the version-only check an already-indexed MCP gets during
/// `initialize` (spec.md §4.7) — shorter than a full probe since it only
/// waits on the connect handshake, not a `list_tools` round trip.
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
/// How many near-miss tool names `run` suggests when a tool can't be
/// resolved (spec.md §4.10 step 1).
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone)]
pub struct DiscoveryResultView {
    pub prefixed_name: String,
    pub mcp_name: String,
    pub tool_name: String,
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct RunSuccess {
    pub content: Vec<ContentBlock>,
}

/// Top-level orchestrator state (spec.md §4.10). Owns the connection pool,
/// the three on-disk caches, the health monitor, and the discovery engine;
/// internal MCP handlers borrow these via [`InternalMcpContext`] rather than
/// holding references of their own.
pub struct Orchestrator {
    paths: NcpPaths,
    profile_name: String,
    profile: Profile,
    index: Arc<SharedIndex>,
    pool: Arc<ConnectionPool<SharedIndex>>,
    health: Arc<HealthMonitor>,
    discovery: Arc<dyn DiscoveryEngine>,
    csv_cache: AsyncMutex<CsvCache>,
    metadata_cache: AsyncMutex<MetadataCache>,
    scheduler: AsyncMutex<TaskManager>,
    reaper: tokio::task::JoinHandle<()>,
    debug: bool,
}

impl Orchestrator {
    /// `orchestrator.initialize()` (spec.md §4.10): loads the profile,
    /// stands up the caches and discovery engine, runs the C9 indexing
    /// pipeline, and starts the connection pool's idle reaper.
    pub async fn initialize(paths: NcpPaths, profile_name: &str) -> Result<Self, NcpError> {
        let profile = load_profile(&paths, profile_name)?;
        Self::initialize_with_profile(paths, profile_name, profile).await
    }

    pub async fn initialize_with_profile(
        paths: NcpPaths,
        profile_name: &str,
        profile: Profile,
    ) -> Result<Self, NcpError> {
        let debug = std::env::var("NCP_DEBUG").as_deref() == Ok("true");
        let current_hash = profile_hash(&profile);

        let mut csv_cache = CsvCache::initialize(&paths, profile_name, &current_hash)
            .map_err(|err| NcpError::CacheCorruption(err.to_string()))?;
        if !csv_cache.validate_cache(&current_hash) {
            csv_cache
                .clear(&current_hash)
                .map_err(|err| NcpError::CacheCorruption(err.to_string()))?;
        }
        let mut metadata_cache = MetadataCache::load(paths.all_tools_json())
            .map_err(|err| NcpError::CacheCorruption(err.to_string()))?;

        let index = SharedIndex::new();
        let health = Arc::new(HealthMonitor::new());
        let discovery: Arc<dyn DiscoveryEngine> = Arc::new(NucleoDiscoveryEngine::new());

        // C9: figure out which MCPs still need (re)indexing, then probe
        // only those; everything else loads straight from the CSV + schema
        // cache without regenerating embeddings.
        let mut to_probe = Vec::new();
        let mut already_indexed = Vec::new();
        for (name, config) in &profile.mcp_servers {
            let cfg_hash = config_hash(config);
            if csv_cache.is_mcp_indexed(name, &cfg_hash) && csv_cache.should_retry_failed(name, false)
            {
                // Indexed and not due for a failure retry: candidate for the
                // version check below rather than an unconditional skip.
                already_indexed.push((name.clone(), config.clone()));
                continue;
            }
            if !csv_cache.is_mcp_indexed(name, &cfg_hash) && csv_cache.should_retry_failed(name, false)
            {
                let transport = config.resolve()?;
                to_probe.push(ProbeTarget {
                    name: name.clone(),
                    transport,
                    config_hash: cfg_hash,
                });
            }
        }

        // Version-Aware Validator (C7, spec.md §4.7): cheaply re-read
        // `serverInfo` for already-indexed MCPs and force a full reindex for
        // any whose live version no longer matches the cached one, rather
        // than trusting a cache entry a server upgrade has made stale.
        if !already_indexed.is_empty() {
            let mut cached_versions = std::collections::HashMap::new();
            let mut live_versions = std::collections::HashMap::new();
            for (name, config) in &already_indexed {
                let Some(cached_version) = metadata_cache
                    .get(name)
                    .and_then(|m| m.server_info.as_ref())
                    .map(|info| info.version.clone())
                else {
                    continue;
                };
                cached_versions.insert(name.clone(), cached_version);
                let Ok(transport) = config.resolve() else {
                    continue;
                };
                if let Ok(Some(info)) =
                    crate::discovery::probe_version_only(name, &transport, VERSION_CHECK_TIMEOUT).await
                {
                    live_versions.insert(name.clone(), info.version);
                }
            }
            let stale = crate::validator::mcps_needing_refresh(&cached_versions, &live_versions);
            for name in &stale {
                csv_cache
                    .invalidate_mcp(name)
                    .map_err(|err| NcpError::CacheCorruption(err.to_string()))?;
                metadata_cache
                    .patch_remove_mcp(name)
                    .map_err(|err| NcpError::CacheCorruption(err.to_string()))?;
                let config = profile
                    .mcp_servers
                    .get(name)
                    .expect("stale mcp name came from profile.mcp_servers");
                let transport = config.resolve()?;
                info!(mcp = name, "server version changed; forcing reindex");
                to_probe.push(ProbeTarget {
                    name: name.clone(),
                    transport,
                    config_hash: config_hash(config),
                });
            }
        }

        if !to_probe.is_empty() {
            let outcome = index_profile(to_probe, &mut csv_cache, &mut metadata_cache, &*discovery)
                .await
                .map_err(|err| NcpError::CacheCorruption(err.to_string()))?;
            info!(indexed = outcome.indexed.len(), failed = outcome.failed.len(), "discovery pass complete");
        }

        // Rebuild the in-memory ToolIndex from whatever is now on disk —
        // both freshly probed MCPs and ones served from a valid cache.
        let rows = csv_cache
            .read_all()
            .map_err(|err| NcpError::CacheCorruption(err.to_string()))?;
        let mut by_mcp: std::collections::HashMap<String, Vec<CsvToolRow>> =
            std::collections::HashMap::new();
        for row in rows {
            by_mcp.entry(row.mcp_name.clone()).or_default().push(row);
        }
        for (mcp_name, config) in &profile.mcp_servers {
            let Some(rows) = by_mcp.get(mcp_name) else {
                continue;
            };
            let metadata = metadata_cache.get(mcp_name);
            let tools = rows
                .iter()
                .map(|row| row_to_tool(row, metadata))
                .collect::<Vec<_>>();
            if let Some(metadata) = metadata {
                discovery.index_mcp_tools_from_cache(mcp_name, &metadata.tools).await;
            } else {
                discovery.index_mcp_tools_from_cache(mcp_name, &tools).await;
            }
            index
                .insert_mcp(MCPDefinition {
                    name: mcp_name.clone(),
                    config: config.clone(),
                    tools,
                    server_info: metadata.and_then(|m| m.server_info.clone()),
                })
                .await;
        }

        let pool = ConnectionPool::new(PoolConfig::default(), Arc::clone(&index), Arc::clone(&health));
        let reaper = pool.spawn_reaper();

        let worker_binary = std::env::current_exe()
            .ok()
            .and_then(|path| path.to_str().map(str::to_string))
            .unwrap_or_else(|| "ncp-mcp-server".to_string());
        let cron = CronManager::new().map_err(|_| NcpError::UnsupportedPlatform)?;
        let scheduler = TaskManager::load(
            paths.tasks_json(),
            paths.timings_json(),
            cron,
            format!("{worker_binary} _timing-fire {{id}}"),
        )
        .map_err(|err| NcpError::CacheCorruption(err.to_string()))?;

        Ok(Self {
            paths,
            profile_name: profile_name.to_string(),
            profile,
            index,
            pool,
            health,
            discovery,
            csv_cache: AsyncMutex::new(csv_cache),
            metadata_cache: AsyncMutex::new(metadata_cache),
            scheduler: AsyncMutex::new(scheduler),
            reaper,
            debug,
        })
    }

    pub fn paths(&self) -> &NcpPaths {
        &self.paths
    }

    /// `find(query, limit, detailed, confidenceThreshold)` (spec.md §4.10).
    /// `detailed` is accepted for interface parity but doesn't change the
    /// ranking — only whether a caller-facing renderer includes full
    /// schemas, which is outside this crate's concern.
    pub async fn find(
        &self,
        query: &str,
        limit: usize,
        _detailed: bool,
        confidence_threshold: f64,
    ) -> Vec<DiscoveryResultView> {
        let limit = if limit == 0 { DEFAULT_FIND_LIMIT } else { limit };

        if query.trim().is_empty() {
            let state = self.index.read().await;
            let names: Vec<String> = state.all_tools.iter().map(|t| t.mcp_name.clone()).collect();
            let healthy = self.health.filter_healthy(&names).await;
            let healthy_set: std::collections::HashSet<&String> = healthy.iter().collect();
            return state
                .all_tools
                .iter()
                .filter(|entry| healthy_set.contains(&entry.mcp_name))
                .take(limit)
                .map(|entry| DiscoveryResultView {
                    prefixed_name: entry.prefixed_name.clone(),
                    mcp_name: entry.mcp_name.clone(),
                    tool_name: entry
                        .prefixed_name
                        .rsplit_once(':')
                        .map(|(_, tool)| tool.to_string())
                        .unwrap_or_else(|| entry.prefixed_name.clone()),
                    description: entry.description.clone(),
                    confidence: 1.0,
                })
                .collect();
        }

        let raw = self.discovery.search(query, limit * 2).await;
        let boosted = apply_term_frequency_boost(
            raw.iter()
                .map(|r| RawResult {
                    name: r.tool_name.clone(),
                    description: r.description.clone(),
                    base_confidence: r.confidence,
                })
                .collect(),
            query,
            &DefaultSearchEnhancer,
        );

        let mcp_names: Vec<String> = raw.iter().map(|r| r.mcp_name.clone()).collect();
        let healthy = self.health.filter_healthy(&mcp_names).await;
        let healthy_set: std::collections::HashSet<&String> = healthy.iter().collect();

        let mut combined: Vec<DiscoveryResultView> = raw
            .into_iter()
            .zip(boosted)
            .filter(|(raw, _)| healthy_set.contains(&raw.mcp_name))
            .filter(|(_, boosted)| boosted.confidence >= confidence_threshold)
            .map(|(raw, boosted)| DiscoveryResultView {
                prefixed_name: raw.prefixed_name,
                mcp_name: raw.mcp_name,
                tool_name: raw.tool_name,
                description: raw.description,
                confidence: boosted.confidence,
            })
            .collect();

        combined.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        combined.truncate(limit);
        combined
    }

    /// `run(toolIdentifier, parameters, meta)` (spec.md §4.10).
    pub async fn run(
        &self,
        tool_identifier: &str,
        parameters: Value,
        meta: Option<Value>,
    ) -> Result<RunSuccess, NcpError> {
        let (mcp, tool_name) = self.resolve_tool(tool_identifier).await?;

        if is_internal_mcp(&mcp) {
            let ctx = InternalMcpContext {
                index: &self.index,
                health: &self.health,
                scheduler: &self.scheduler,
                paths: &self.paths,
            };
            let value = dispatch_internal_tool(&mcp, &tool_name, parameters, &ctx).await?;
            return Ok(RunSuccess {
                content: vec![ContentBlock::Text { text: value.to_string() }],
            });
        }

        self.validate_parameters(&mcp, &tool_name, &parameters).await?;

        let client = self.pool.get_or_create(&mcp).await?;
        let outcome = client
            .call_tool(tool_name.clone(), Some(parameters), CALL_TOOL_TIMEOUT)
            .await;

        match outcome {
            Ok(result) => {
                self.health.mark_healthy(&mcp).await;
                if result.is_error {
                    let message = extract_text(&result.content);
                    return Err(NcpError::ToolExecutionError {
                        mcp,
                        tool: tool_name,
                        message,
                        code: None,
                        data: None,
                    });
                }
                Ok(RunSuccess { content: result.content })
            }
            Err(err) => {
                self.health.mark_unhealthy(&mcp, err.to_string()).await;
                Err(NcpError::ToolExecutionError {
                    mcp,
                    tool: tool_name,
                    message: err.to_string(),
                    code: None,
                    data: None,
                })
            }
        }
    }

    /// `readResource(uri)` (spec.md §4.10): parses `mcp:<restOfUri>`, opens
    /// a short-lived connection that is never pooled, and returns the
    /// first content item's text.
    pub async fn read_resource(&self, uri: &str) -> Result<String, NcpError> {
        let (mcp, rest) = uri.split_once(':').ok_or_else(|| NcpError::ConfigError(
            format!("resource uri '{uri}' is not of the form 'mcp:rest'"),
        ))?;
        let transport = {
            let state = self.index.read().await;
            let definition = state.definitions.get(mcp).ok_or_else(|| NcpError::McpNotFound {
                name: mcp.to_string(),
                suggestions: Vec::new(),
            })?;
            definition.config.resolve()?
        };

        let client = crate::pool::connect_transient(mcp, &transport, CALL_TOOL_TIMEOUT).await?;
        let result = client
            .read_resource(rest, CALL_TOOL_TIMEOUT)
            .await
            .map_err(|err| NcpError::ToolExecutionError {
                mcp: mcp.to_string(),
                tool: "readResource".to_string(),
                message: err.to_string(),
                code: None,
                data: None,
            })?;
        client.close().await;
        Ok(result
            .contents
            .into_iter()
            .find_map(|c| c.text)
            .unwrap_or_default())
    }

    /// Incrementally indexes only the MCPs in `new_configs` (spec.md
    /// §4.10's `triggerAutoImport`). The profile manager that diffs a
    /// client's declared MCPs against the active profile is out of scope;
    /// this just runs C9 for whatever it hands back, then inserts every
    /// successfully-indexed MCP into the in-memory `ToolIndex` so it's
    /// immediately visible to `find`/`run` without a restart.
    pub async fn index_additional_mcps(
        &self,
        new_configs: Vec<(String, crate::config_types::McpServerConfig)>,
    ) -> Result<(), NcpError> {
        let mut targets = Vec::new();
        let mut configs_by_name = std::collections::HashMap::new();
        for (name, config) in new_configs {
            let transport = config.resolve()?;
            targets.push(ProbeTarget {
                name: name.clone(),
                transport,
                config_hash: config_hash(&config),
            });
            configs_by_name.insert(name, config);
        }
        let mut csv_cache = self.csv_cache.lock().await;
        let mut metadata_cache = self.metadata_cache.lock().await;
        let outcome = index_profile(targets, &mut csv_cache, &mut metadata_cache, &*self.discovery)
            .await
            .map_err(|err| NcpError::CacheCorruption(err.to_string()))?;
        for name in &outcome.indexed {
            let Some(config) = configs_by_name.get(name) else {
                continue;
            };
            let metadata = metadata_cache.get(name);
            let tools = metadata.map(|m| m.tools.clone()).unwrap_or_default();
            let server_info = metadata.and_then(|m| m.server_info.clone());
            self.index
                .insert_mcp(MCPDefinition {
                    name: name.clone(),
                    config: config.clone(),
                    tools,
                    server_info,
                })
                .await;
        }
        Ok(())
    }

    /// `triggerAutoImport(clientName)` (spec.md §4.10): invoked once after
    /// the MCP client handshake completes. The profile manager that
    /// actually discovers a client's declared MCPs and merges them into the
    /// active profile file is out of scope (spec.md §1); this re-reads the
    /// profile from disk — the hand-off point to that external
    /// collaborator — and incrementally indexes whatever MCPs appear there
    /// that aren't in the in-memory index yet. Returns the number of newly
    /// indexed MCPs.
    pub async fn trigger_auto_import(&self, client_name: &str) -> Result<usize, NcpError> {
        let reloaded = crate::profile::load_profile(&self.paths, &self.profile_name)?;
        let new_configs: Vec<(String, crate::config_types::McpServerConfig)> = {
            let state = self.index.read().await;
            reloaded
                .mcp_servers
                .iter()
                .filter(|(name, _)| !state.definitions.contains_key(*name))
                .map(|(name, config)| (name.clone(), config.clone()))
                .collect()
        };
        let count = new_configs.len();
        if count > 0 {
            info!(client = client_name, count, "auto-importing newly declared MCPs");
            self.index_additional_mcps(new_configs).await?;
        }
        Ok(count)
    }

    /// Idempotent, best-effort teardown (spec.md §4.10, §9): stops the
    /// reaper, finalizes the CSV, closes every pooled connection.
    pub async fn cleanup(&self) {
        self.reaper.abort();
        if let Err(err) = self.csv_cache.lock().await.finalize() {
            warn!(error = %err, "failed to finalize CSV cache during cleanup");
        }
        self.pool.cleanup().await;
    }

    async fn resolve_tool(&self, tool_identifier: &str) -> Result<(String, String), NcpError> {
        if let Some((mcp, tool)) = tool_identifier.split_once(':') {
            if is_internal_mcp(mcp) {
                return Ok((mcp.to_string(), tool.to_string()));
            }
            let state = self.index.read().await;
            if state.definitions.contains_key(mcp) {
                return Ok((mcp.to_string(), tool.to_string()));
            }
        }

        let state = self.index.read().await;
        if let Some(mcp) = state.tool_to_mcp.get(tool_identifier) {
            let tool_name = tool_identifier
                .split_once(':')
                .map(|(_, tool)| tool.to_string())
                .unwrap_or_else(|| tool_identifier.to_string());
            return Ok((mcp.clone(), tool_name));
        }

        let mut candidates: Vec<&String> = state.all_tools.iter().map(|t| &t.prefixed_name).collect();
        candidates.sort_by_key(|name| levenshtein(tool_identifier, name));
        let suggestions = candidates
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .cloned()
            .collect();
        Err(NcpError::McpNotFound {
            name: tool_identifier.to_string(),
            suggestions,
        })
    }

    /// Required-parameter check only (spec.md §4.10.2): a parameter is
    /// missing iff absent, `null`, or an empty string. Type checking is
    /// advisory and left to the downstream server.
    async fn validate_parameters(&self, mcp: &str, tool: &str, parameters: &Value) -> Result<(), NcpError> {
        let state = self.index.read().await;
        let Some(definition) = state.definitions.get(mcp) else {
            return Ok(());
        };
        let Some(tool_def) = definition.tools.iter().find(|t| t.name == tool) else {
            return Ok(());
        };
        let Some(required) = &tool_def.input_schema.required else {
            return Ok(());
        };

        let missing: Vec<String> = required
            .iter()
            .filter(|key| is_missing(parameters, key))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(NcpError::ValidationError { missing })
        }
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.index
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }
}

fn is_missing(parameters: &Value, key: &str) -> bool {
    match parameters.get(key) {
        None => true,
        Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn extract_text(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn row_to_tool(row: &CsvToolRow, metadata: Option<&McpMetadata>) -> mcp_types::Tool {
    if let Some(metadata) = metadata {
        if let Some(tool) = metadata.tools.iter().find(|t| t.name == row.tool_name) {
            return tool.clone();
        }
    }
    mcp_types::Tool {
        name: row.tool_name.clone(),
        description: Some(row.description.clone()),
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

/// Classic Levenshtein edit distance, used only to rank near-miss tool name
/// suggestions (spec.md §4.10 step 1) — not performance-critical.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let cur = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j - 1])
            };
            prev = cur;
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::config_types::McpServerConfig;
    use std::collections::HashMap;

    fn tool(name: &str) -> mcp_types::Tool {
        mcp_types::Tool {
            name: name.to_string(),
            description: Some(format!("{name} tool")),
            input_schema: mcp_types::ToolInputSchema {
                r#type: "object".to_string(),
                properties: None,
                required: Some(vec!["path".to_string()]),
            },
            output_schema: None,
            title: None,
            annotations: None,
        }
    }

    async fn orchestrator_with_one_tool(dir: &std::path::Path) -> Orchestrator {
        let paths = NcpPaths::new(dir.to_path_buf());
        let mut profile = Profile::default();
        profile.mcp_servers.insert(
            "fs".to_string(),
            McpServerConfig {
                command: Some("echo-tools".to_string()),
                args: Vec::new(),
                env: HashMap::new(),
                url: None,
                transport: None,
                session_id: None,
                auth: None,
            },
        );
        let orchestrator = Orchestrator::initialize_with_profile(paths, "default", profile)
            .await
            .unwrap();
        orchestrator
            .index
            .insert_mcp(MCPDefinition {
                name: "fs".to_string(),
                config: McpServerConfig {
                    command: Some("echo-tools".to_string()),
                    args: Vec::new(),
                    env: HashMap::new(),
                    url: None,
                    transport: None,
                    session_id: None,
                    auth: None,
                },
                tools: vec![tool("write")],
                server_info: None,
            })
            .await;
        orchestrator
    }

    #[tokio::test]
    async fn run_with_missing_required_parameter_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator_with_one_tool(dir.path()).await;
        let err = orchestrator
            .run("fs:write", serde_json::json!({}), None)
            .await
            .unwrap_err();
        match err {
            NcpError::ValidationError { missing } => {
                assert_eq!(missing, vec!["path".to_string()]);
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unresolvable_tool_suggests_near_misses() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator_with_one_tool(dir.path()).await;
        let err = orchestrator
            .run("fs:writ", serde_json::json!({"path": "/tmp/x"}), None)
            .await
            .unwrap_err();
        match err {
            NcpError::McpNotFound { suggestions, .. } => assert!(!suggestions.is_empty()),
            other => panic!("expected McpNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_query_find_returns_healthy_tools_at_full_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator_with_one_tool(dir.path()).await;
        let results = orchestrator.find("", 5, false, DEFAULT_CONFIDENCE_THRESHOLD).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].confidence, 1.0);
    }

    #[test]
    fn levenshtein_identical_strings_is_zero() {
        assert_eq!(levenshtein("fs:write", "fs:write"), 0);
    }
}
