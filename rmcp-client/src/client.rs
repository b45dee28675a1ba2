//! Thin wrapper over `rmcp`'s client exposing the five operations the
//! connection pool and orchestrator need: connect, list tools, call a tool,
//! list resources/prompts, and close (spec.md §4.2).

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use rmcp::ServiceExt;
use rmcp::model::CallToolRequestParam;
use rmcp::model::ClientInfo;
use rmcp::service::RunningService;
use rmcp::service::ServiceError;
use rmcp::transport::SseClientTransport;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::TokioChildProcess;
use tokio::process::Command;
use tokio::sync::Mutex;

use mcp_types::CallToolResult;
use mcp_types::Implementation;
use mcp_types::ListPromptsResult;
use mcp_types::ListResourcesResult;
use mcp_types::ListToolsResult;
use mcp_types::ReadResourceResult;

use crate::SILENCING_ENV_VARS;
use crate::runtime::resolve_stdio_command;

const NCP_CLIENT_NAME: &str = "ncp";

/// Live connection to one downstream MCP server, over whichever transport it
/// was opened with. Connection-pool code (`ncp-core::pool`) is the only
/// caller that should ever construct one of these.
pub struct RmcpClient {
    inner: Mutex<Option<RunningService<rmcp::RoleClient, ClientInfo>>>,
    server_info: Option<Implementation>,
}

impl RmcpClient {
    /// Spawns `command` as a child process and speaks MCP over its stdio.
    /// `command` is resolved against the well-known interpreter table and
    /// PATH (spec.md §4.1) before spawning.
    pub async fn connect_stdio(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        startup_timeout: Duration,
    ) -> Result<Self> {
        let (program, prefix_args) = resolve_stdio_command(command);
        let mut cmd = Command::new(program);
        cmd.args(prefix_args);
        cmd.args(args);
        cmd.env_clear();
        cmd.envs(env);
        for (key, value) in SILENCING_ENV_VARS {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                cmd.pre_exec(|| {
                    let _ = libc::setpgid(0, 0);
                    Ok(())
                });
            }
        }

        let transport =
            TokioChildProcess::new(cmd).context("spawning stdio MCP server child process")?;
        Self::connect_with_timeout(transport, startup_timeout).await
    }

    /// Connects over streamable HTTP, attaching `headers` (auth, if any) to
    /// every request.
    pub async fn connect_streamable_http(
        url: &str,
        headers: HashMap<String, String>,
        startup_timeout: Duration,
    ) -> Result<Self> {
        let transport = StreamableHttpClientTransport::with_client(
            build_reqwest_client(&headers)?,
            rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig::with_uri(
                url.to_string(),
            ),
        );
        Self::connect_with_timeout(transport, startup_timeout).await
    }

    /// Connects over SSE, attaching `headers` (auth, if any) to the initial
    /// event-stream request.
    pub async fn connect_sse(
        url: &str,
        headers: HashMap<String, String>,
        startup_timeout: Duration,
    ) -> Result<Self> {
        let transport =
            SseClientTransport::start_with_client(build_reqwest_client(&headers)?, url.to_string())
                .await
                .context("opening SSE connection to MCP server")?;
        Self::connect_with_timeout(transport, startup_timeout).await
    }

    async fn connect_with_timeout<T>(transport: T, startup_timeout: Duration) -> Result<Self>
    where
        T: rmcp::transport::IntoTransport<rmcp::RoleClient, std::io::Error, rmcp::transport::TokioIo>
            + 'static,
    {
        let client_info = ClientInfo {
            protocol_version: Default::default(),
            capabilities: Default::default(),
            client_info: rmcp::model::Implementation {
                name: NCP_CLIENT_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let running = tokio::time::timeout(startup_timeout, client_info.serve(transport))
            .await
            .context("MCP server did not complete initialize handshake in time")?
            .context("MCP initialize handshake failed")?;

        let server_info = running
            .peer_info()
            .map(|info| Implementation {
                name: info.server_info.name.clone(),
                version: info.server_info.version.clone(),
                title: None,
                user_agent: None,
            });

        Ok(Self {
            inner: Mutex::new(Some(running)),
            server_info,
        })
    }

    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }

    pub async fn list_tools(&self, timeout: Duration) -> Result<ListToolsResult> {
        let guard = self.inner.lock().await;
        let running = Self::require_open(&guard)?;
        let result = tokio::time::timeout(timeout, running.list_tools(Default::default()))
            .await
            .context("tools/list timed out")?
            .map_err(map_service_error)?;
        Ok(serde_json::from_value(serde_json::to_value(result)?)?)
    }

    pub async fn call_tool(
        &self,
        name: String,
        arguments: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<CallToolResult> {
        let guard = self.inner.lock().await;
        let running = Self::require_open(&guard)?;
        let params = CallToolRequestParam {
            name: name.into(),
            arguments: arguments.and_then(|value| value.as_object().cloned()),
        };
        let result = tokio::time::timeout(timeout, running.call_tool(params))
            .await
            .context("tools/call timed out")?
            .map_err(map_service_error)?;
        Ok(serde_json::from_value(serde_json::to_value(result)?)?)
    }

    pub async fn list_resources(&self, timeout: Duration) -> Result<ListResourcesResult> {
        let guard = self.inner.lock().await;
        let running = Self::require_open(&guard)?;
        let result = tokio::time::timeout(timeout, running.list_resources(Default::default()))
            .await
            .context("resources/list timed out")?
            .map_err(map_service_error)?;
        Ok(serde_json::from_value(serde_json::to_value(result)?)?)
    }

    pub async fn read_resource(&self, uri: &str, timeout: Duration) -> Result<ReadResourceResult> {
        let guard = self.inner.lock().await;
        let running = Self::require_open(&guard)?;
        let params = rmcp::model::ReadResourceRequestParam {
            uri: uri.to_string(),
        };
        let result = tokio::time::timeout(timeout, running.read_resource(params))
            .await
            .context("resources/read timed out")?
            .map_err(map_service_error)?;
        Ok(serde_json::from_value(serde_json::to_value(result)?)?)
    }

    pub async fn list_prompts(&self, timeout: Duration) -> Result<ListPromptsResult> {
        let guard = self.inner.lock().await;
        let running = Self::require_open(&guard)?;
        let result = tokio::time::timeout(timeout, running.list_prompts(Default::default()))
            .await
            .context("prompts/list timed out")?
            .map_err(map_service_error)?;
        Ok(serde_json::from_value(serde_json::to_value(result)?)?)
    }

    /// Closes the connection. Idempotent: calling it twice is a no-op.
    pub async fn close(&self) {
        if let Some(running) = self.inner.lock().await.take() {
            let _ = running.cancel().await;
        }
    }

    fn require_open(
        guard: &tokio::sync::MutexGuard<'_, Option<RunningService<rmcp::RoleClient, ClientInfo>>>,
    ) -> Result<&RunningService<rmcp::RoleClient, ClientInfo>> {
        guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("MCP client is closed"))
    }
}

fn build_reqwest_client(headers: &HashMap<String, String>) -> Result<reqwest::Client> {
    let mut header_map = reqwest::header::HeaderMap::new();
    for (key, value) in headers {
        let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
            .with_context(|| format!("invalid header name `{key}`"))?;
        let value = reqwest::header::HeaderValue::from_str(value)
            .with_context(|| format!("invalid header value for `{key}`"))?;
        header_map.insert(name, value);
    }
    reqwest::Client::builder()
        .default_headers(header_map)
        .build()
        .context("building reqwest client for MCP transport")
}

fn map_service_error(err: ServiceError) -> anyhow::Error {
    anyhow::anyhow!("MCP server returned an error: {err}")
}
