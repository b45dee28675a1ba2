//! Error taxonomy (spec.md §7). Variant names are part of the contract
//! consumed by `mcp-server`'s structured `run` responses; don't rename them
//! without checking `orchestrator::run`'s error formatting.

use serde::Serialize;

/// Classification used by the CSV cache's backoff bookkeeping and by
/// `NcpError::ConnectionError`/`TimeoutError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ConnectionRefused,
    CommandNotFound,
    Unknown,
}

impl FailureKind {
    pub fn classify(err: &anyhow::Error) -> Self {
        let message = err.to_string().to_lowercase();
        if message.contains("timed out") || message.contains("timeout") {
            return Self::Timeout;
        }
        if message.contains("connection refused") || message.contains("econnrefused") {
            return Self::ConnectionRefused;
        }
        if message.contains("no such file or directory")
            || message.contains("command not found")
            || message.contains("os error 2")
        {
            return Self::CommandNotFound;
        }
        Self::Unknown
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NcpError {
    #[error("{0}")]
    ConfigError(String),

    #[error("tool or MCP '{name}' not found")]
    McpNotFound {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("Missing required parameters: {}", .missing.join(", "))]
    ValidationError { missing: Vec<String> },

    #[error("operation timed out after {0:?}")]
    TimeoutError(std::time::Duration),

    #[error("failed to connect to MCP '{mcp}': {source}")]
    ConnectionError {
        mcp: String,
        kind: FailureKind,
        #[source]
        source: anyhow::Error,
    },

    #[error("tool '{tool}' failed in MCP '{mcp}': {message}")]
    ToolExecutionError {
        mcp: String,
        tool: String,
        message: String,
        code: Option<i64>,
        data: Option<serde_json::Value>,
    },

    #[error("the scheduler is not supported on this platform")]
    UnsupportedPlatform,

    #[error("cache corrupted: {0}")]
    CacheCorruption(String),
}

impl NcpError {
    /// Renders the exact structured-failure string shape spec.md §7 mandates
    /// for `run`'s `{success:false, error: ...}` response.
    pub fn to_run_failure_message(&self, debug: bool) -> String {
        let mut out = match self {
            NcpError::ToolExecutionError {
                mcp,
                tool,
                message,
                code,
                data,
            } => {
                let mut s = format!("Tool '{tool}' failed in MCP '{mcp}': {message}");
                if let Some(code) = code {
                    s.push_str(&format!("\nError Code: {code}"));
                }
                if let Some(data) = data {
                    s.push_str(&format!("\nDetails: {data}"));
                }
                s.push_str("\n\nTroubleshooting: verify the MCP server is running and the parameters match its schema.");
                s
            }
            other => other.to_string(),
        };
        if debug {
            out.push_str(&format!("\n\n[debug] {self:?}"));
        }
        out
    }
}

pub type Result<T> = std::result::Result<T, NcpError>;
