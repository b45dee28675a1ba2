//! The indexing pipeline itself (spec.md §4.9), run during
//! `orchestrator.initialize()`.

use std::time::Duration;

use chrono::Utc;
use mcp_types::Tool;
use tracing::warn;

use crate::cache::CsvCache;
use crate::cache::MetadataCache;
use crate::cache::csv_cache::CsvToolRow;
use crate::cache::metadata_cache::McpMetadata;
use crate::config_types::McpServerTransportConfig;
use crate::discovery::DiscoveryEngine;
use crate::error::FailureKind;
use crate::pool::connect_transient;

/// What the pipeline needs to know to probe one MCP; kept separate from
/// `config_types::McpServerConfig` so callers can plug in already-resolved
/// transports.
pub struct ProbeTarget {
    pub name: String,
    pub transport: McpServerTransportConfig,
    pub config_hash: String,
}

#[derive(Debug, Default)]
pub struct IndexingOutcome {
    pub indexed: Vec<String>,
    pub failed: Vec<String>,
}

const QUICK_PROBE_TIMEOUT: Duration = Duration::from_secs(8);
const SLOW_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Probes every target in `targets`, appending successes to the CSV cache
/// and indexing them into `engine`; failures are recorded via
/// `CsvCache::mark_failed` and do not abort the batch.
pub async fn index_profile(
    targets: Vec<ProbeTarget>,
    csv_cache: &mut CsvCache,
    metadata_cache: &mut MetadataCache,
    engine: &dyn DiscoveryEngine,
) -> anyhow::Result<IndexingOutcome> {
    let mut outcome = IndexingOutcome::default();
    for target in targets {
        match probe_with_two_tier_timeout(&target.name, &target.transport).await {
            Ok((tools, server_info)) => {
                let now = Utc::now().to_rfc3339();
                let rows: Vec<CsvToolRow> = tools
                    .iter()
                    .map(|tool| CsvToolRow {
                        mcp_name: target.name.clone(),
                        tool_id: format!("{}:{}", target.name, tool.name),
                        tool_name: tool.name.clone(),
                        description: tool.description.clone().unwrap_or_default(),
                        hash: target.config_hash.clone(),
                        timestamp: now.clone(),
                    })
                    .collect();
                csv_cache.append_mcp(&target.name, &target.config_hash, &rows)?;
                metadata_cache.patch_add_mcp(
                    &target.name,
                    McpMetadata {
                        tools: tools.clone(),
                        server_info,
                    },
                )?;
                engine.index_mcp_tools(&target.name, &tools).await;
                outcome.indexed.push(target.name.clone());
            }
            Err(err) => {
                warn!(mcp = %target.name, error = %err, "probe failed");
                csv_cache.mark_failed(&target.name, &err)?;
                outcome.failed.push(target.name);
            }
        }
    }
    csv_cache.finalize()?;
    Ok(outcome)
}

/// First attempt with `quickProbeTimeout`; only a *timeout* failure earns a
/// retry at `slowProbeTimeout` (spec.md §4.9). Any other failure
/// (connection refused, command not found, protocol error) is not retried.
async fn probe_with_two_tier_timeout(
    mcp: &str,
    transport: &McpServerTransportConfig,
) -> anyhow::Result<(Vec<Tool>, Option<mcp_types::Implementation>)> {
    match probe_once(mcp, transport, QUICK_PROBE_TIMEOUT).await {
        Ok(result) => Ok(result),
        Err(err) if FailureKind::classify(&err) == FailureKind::Timeout => {
            probe_once(mcp, transport, SLOW_PROBE_TIMEOUT).await
        }
        Err(err) => Err(err),
    }
}

/// Connects and reads back `serverInfo` only, skipping `list_tools` (spec.md
/// §4.7's version-aware validator cheap check): called for MCPs the cache
/// already considers indexed, to decide whether they need a full reprobe
/// this cycle without paying for one up front.
pub async fn probe_version_only(
    mcp: &str,
    transport: &McpServerTransportConfig,
    timeout: Duration,
) -> anyhow::Result<Option<mcp_types::Implementation>> {
    let client = connect_transient(mcp, transport, timeout).await?;
    let server_info = client.server_info().cloned();
    client.close().await;
    Ok(server_info)
}

/// Connects the same way the pool does (auth headers included for remote
/// transports) for a single list-tools round trip, then drops the
/// connection; indexing never keeps a probe connection warm.
async fn probe_once(
    mcp: &str,
    transport: &McpServerTransportConfig,
    timeout: Duration,
) -> anyhow::Result<(Vec<Tool>, Option<mcp_types::Implementation>)> {
    let client = connect_transient(mcp, transport, timeout).await?;
    let list = client.list_tools(timeout).await?;
    let server_info = client.server_info().cloned();
    client.close().await;
    Ok((list.tools, server_info))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use std::collections::HashMap;

    use super::*;
    use crate::discovery::NucleoDiscoveryEngine;
    use crate::paths::NcpPaths;

    #[tokio::test]
    async fn unreachable_command_is_recorded_as_failed_without_aborting_batch() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let mut csv_cache = CsvCache::initialize(&paths, "default", "hash").unwrap();
        let mut metadata_cache = MetadataCache::load(paths.all_tools_json()).unwrap();
        let engine = NucleoDiscoveryEngine::new();

        let targets = vec![ProbeTarget {
            name: "ghost".to_string(),
            transport: McpServerTransportConfig::Stdio {
                command: "definitely-not-a-real-binary-xyz".to_string(),
                args: Vec::new(),
                env: HashMap::new(),
            },
            config_hash: "h".to_string(),
        }];

        let outcome = index_profile(targets, &mut csv_cache, &mut metadata_cache, &engine)
            .await
            .unwrap();
        assert_eq!(outcome.failed, vec!["ghost".to_string()]);
        assert!(outcome.indexed.is_empty());
        assert!(csv_cache.header().failed_mcps.contains_key("ghost"));
    }
}
