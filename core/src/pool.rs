//! Connection Pool (C8, spec.md §4.8). One open [`RmcpClient`] per MCP name,
//! bounded by `maxConnections` with LRU eviction, idle/over-use reaping, and
//! a hard reconnect after `maxExecutionsPerConnection` calls.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use ncp_rmcp_client::RmcpClient;
use tokio::sync::RwLock;
use tracing::info;
use tracing::warn;

use crate::config_types::McpServerTransportConfig;
use crate::config_types::RemoteTransportKind;
use crate::error::FailureKind;
use crate::error::NcpError;
use crate::health::HealthMonitor;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub idle_timeout: Duration,
    pub cleanup_interval: Duration,
    pub max_executions_per_connection: u64,
    pub connection_timeout: Duration,
    pub quick_probe_timeout: Duration,
    pub slow_probe_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 50,
            idle_timeout: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(60),
            max_executions_per_connection: 1000,
            connection_timeout: Duration::from_secs(10),
            quick_probe_timeout: Duration::from_secs(8),
            slow_probe_timeout: Duration::from_secs(30),
        }
    }
}

struct Entry {
    client: Arc<RmcpClient>,
    last_used_at: Instant,
    execution_count: u64,
    /// Calls currently in flight on this connection. The reaper skips any
    /// entry with `in_flight > 0` even if it's past its idle timeout or
    /// execution cap, so a tick never closes a connection mid-call.
    in_flight: Arc<AtomicU32>,
}

/// Hands out a connection plus the lease that marks it in-flight for the
/// reaper's benefit; dropping this (including on an error return via `?`)
/// always releases the lease, regardless of how the call ended.
pub struct PooledClient {
    client: Arc<RmcpClient>,
    in_flight: Arc<AtomicU32>,
}

impl Deref for PooledClient {
    type Target = RmcpClient;
    fn deref(&self) -> &RmcpClient {
        &self.client
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A single MCP's resolved connect parameters, looked up from the
/// orchestrator's definitions by name.
#[async_trait]
pub trait ConnectTarget: Send + Sync {
    async fn transport_config(&self, mcp: &str) -> Option<McpServerTransportConfig>;
}

pub struct ConnectionPool<T: ConnectTarget> {
    config: PoolConfig,
    target: Arc<T>,
    health: Arc<HealthMonitor>,
    /// Preserves insertion/access order for LRU eviction: the front is
    /// least-recently-used.
    entries: RwLock<HashMap<String, Entry>>,
    order: RwLock<Vec<String>>,
}

impl<T: ConnectTarget + 'static> ConnectionPool<T> {
    pub fn new(config: PoolConfig, target: Arc<T>, health: Arc<HealthMonitor>) -> Arc<Self> {
        Arc::new(Self {
            config,
            target,
            health,
            entries: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        })
    }

    /// Spawns the background reaper; keep the returned handle alive for as
    /// long as the pool should be reaped (orchestrator owns it).
    pub fn spawn_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.cleanup_interval);
            loop {
                ticker.tick().await;
                pool.reap().await;
            }
        })
    }

    async fn reap(&self) {
        let stale: Vec<String> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, entry)| {
                    entry.in_flight.load(Ordering::Acquire) == 0
                        && (entry.last_used_at.elapsed() > self.config.idle_timeout
                            || entry.execution_count >= self.config.max_executions_per_connection)
                })
                .map(|(name, _)| name.clone())
                .collect()
        };
        for name in stale {
            self.disconnect(&name).await;
        }
    }

    /// spec.md §4.8's `getOrCreate` algorithm. Returns a [`PooledClient`]
    /// whose lease marks the connection in-flight until dropped, so the
    /// reaper never closes it mid-call.
    pub async fn get_or_create(&self, mcp: &str) -> Result<PooledClient, NcpError> {
        {
            let mut entries = self.entries.write().await;
            if let Some(entry) = entries.get_mut(mcp) {
                if entry.execution_count < self.config.max_executions_per_connection {
                    entry.last_used_at = Instant::now();
                    entry.execution_count += 1;
                    entry.in_flight.fetch_add(1, Ordering::AcqRel);
                    let leased = PooledClient {
                        client: Arc::clone(&entry.client),
                        in_flight: Arc::clone(&entry.in_flight),
                    };
                    self.touch_order(mcp).await;
                    return Ok(leased);
                }
            }
        }
        // Either absent, or over the execution cap — drop it and fall through.
        self.disconnect(mcp).await;

        if self.len().await >= self.config.max_connections {
            self.evict_lru().await;
        }

        let transport_config = self.target.transport_config(mcp).await.ok_or_else(|| {
            NcpError::McpNotFound {
                name: mcp.to_string(),
                suggestions: Vec::new(),
            }
        })?;

        let client = self.connect(mcp, &transport_config).await?;
        let in_flight = Arc::new(AtomicU32::new(1));
        let entry = Entry {
            client: Arc::clone(&client),
            last_used_at: Instant::now(),
            execution_count: 1,
            in_flight: Arc::clone(&in_flight),
        };
        self.entries.write().await.insert(mcp.to_string(), entry);
        self.touch_order(mcp).await;
        self.health.mark_healthy(mcp).await;
        info!(mcp, "mcp:connected");
        Ok(PooledClient { client, in_flight })
    }

    async fn connect(
        &self,
        mcp: &str,
        config: &McpServerTransportConfig,
    ) -> Result<Arc<RmcpClient>, NcpError> {
        connect_transient(mcp, config, self.config.connection_timeout)
            .await
            .map(Arc::new)
    }

    pub async fn disconnect(&self, mcp: &str) {
        let removed = self.entries.write().await.remove(mcp);
        if let Some(entry) = removed {
            entry.client.close().await;
            let mut order = self.order.write().await;
            order.retain(|name| name != mcp);
            info!(mcp, "mcp:disconnected");
        }
    }

    async fn touch_order(&self, mcp: &str) {
        let mut order = self.order.write().await;
        order.retain(|name| name != mcp);
        order.push(mcp.to_string());
    }

    async fn evict_lru(&self) {
        let victim = {
            let order = self.order.read().await;
            order.first().cloned()
        };
        if let Some(victim) = victim {
            warn!(mcp = %victim, "evicting least-recently-used connection");
            self.disconnect(&victim).await;
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn cleanup(&self) {
        let names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        for name in names {
            self.disconnect(&name).await;
        }
    }
}

/// Opens a single connection outside the pool's lifecycle management —
/// `orchestrator::read_resource` uses this for a one-shot resource read that
/// isn't worth keeping warm (spec.md §4.10).
pub async fn connect_transient(
    mcp: &str,
    config: &McpServerTransportConfig,
    timeout: Duration,
) -> Result<RmcpClient, NcpError> {
    let result = match config {
        McpServerTransportConfig::Stdio { command, args, env } => {
            RmcpClient::connect_stdio(command, args, env, timeout).await
        }
        McpServerTransportConfig::Remote {
            url,
            transport,
            auth,
            ..
        } => {
            let headers = match auth {
                Some(auth_kind) => {
                    build_headers(mcp, auth_kind)
                        .await
                        .map_err(|source| NcpError::ConnectionError {
                            mcp: mcp.to_string(),
                            kind: FailureKind::Unknown,
                            source,
                        })?
                }
                None => HashMap::new(),
            };
            match transport {
                RemoteTransportKind::Sse => RmcpClient::connect_sse(url, headers, timeout).await,
                RemoteTransportKind::StreamableHttp => {
                    RmcpClient::connect_streamable_http(url, headers, timeout).await
                }
            }
        }
    };
    result.map_err(|source| {
        let kind = FailureKind::classify(&source);
        NcpError::ConnectionError {
            mcp: mcp.to_string(),
            kind,
            source,
        }
    })
}

/// Translates this crate's `AuthKind` into `rmcp-client`'s `AuthConfig` and
/// builds the header map, keying the OAuth token store on `mcp` — the
/// profile's name for this server — so two OAuth-secured MCPs in the same
/// profile don't collide on the same keyring entry.
async fn build_headers(
    mcp: &str,
    auth: &crate::config_types::AuthKind,
) -> Result<HashMap<String, String>> {
    use crate::config_types::AuthKind;
    use ncp_rmcp_client::AuthConfig;

    let rmcp_auth = match auth {
        AuthKind::Bearer { token } => AuthConfig::Bearer {
            token: token.clone(),
        },
        AuthKind::ApiKey { header_name, key } => AuthConfig::ApiKey {
            header_name: header_name.clone(),
            key: key.clone(),
        },
        AuthKind::Basic { username, password } => AuthConfig::Basic {
            username: username.clone(),
            password: password.clone(),
        },
        AuthKind::OAuth {
            client_id,
            auth_url,
            token_url,
            device_auth_url,
            scopes,
            ..
        } => AuthConfig::OAuth {
            server_name: mcp.to_string(),
            client_id: client_id.clone(),
            auth_url: auth_url.clone(),
            token_url: token_url.clone(),
            device_auth_url: device_auth_url.clone(),
            scopes: scopes.clone(),
        },
    };
    ncp_rmcp_client::build_auth_headers(&rmcp_auth)
        .await
        .context("building auth headers")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    struct NoTargets;
    #[async_trait]
    impl ConnectTarget for NoTargets {
        async fn transport_config(&self, _mcp: &str) -> Option<McpServerTransportConfig> {
            None
        }
    }

    #[tokio::test]
    async fn unknown_mcp_reports_not_found() {
        let health = Arc::new(HealthMonitor::new());
        let pool = ConnectionPool::new(PoolConfig::default(), Arc::new(NoTargets), health);
        let err = pool.get_or_create("ghost").await.unwrap_err();
        assert!(matches!(err, NcpError::McpNotFound { .. }));
    }
}
