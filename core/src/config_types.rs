//! Profile / MCP server configuration shapes (spec.md §3).

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::error::NcpError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AuthKind {
    Bearer {
        token: String,
    },
    ApiKey {
        #[serde(default = "default_api_key_header")]
        header_name: String,
        key: String,
    },
    Basic {
        username: String,
        password: String,
    },
    OAuth {
        client_id: String,
        auth_url: String,
        token_url: String,
        device_auth_url: String,
        #[serde(default)]
        scopes: Vec<String>,
    },
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RemoteTransportKind {
    Sse,
    StreamableHttp,
}

impl Default for RemoteTransportKind {
    fn default() -> Self {
        Self::StreamableHttp
    }
}

/// One entry of a Profile's `mcpServers` map. Exactly one of `command` or
/// `url` must be present; this is enforced by [`MCPServerConfig::validate`]
/// rather than encoded as an externally-tagged enum, so the raw wire shape
/// stays a flat JSON object like the profile loader (out of scope) produces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct McpServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<RemoteTransportKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthKind>,
}

/// The resolved, validated form of [`McpServerConfig`] (spec.md §3's
/// "exactly one of `command` or `url`" invariant).
#[derive(Debug, Clone)]
pub enum McpServerTransportConfig {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Remote {
        url: String,
        transport: RemoteTransportKind,
        session_id: Option<String>,
        auth: Option<AuthKind>,
    },
}

impl McpServerConfig {
    pub fn resolve(&self) -> Result<McpServerTransportConfig, NcpError> {
        match (&self.command, &self.url) {
            (Some(_), Some(_)) => Err(NcpError::ConfigError(
                "MCP server config must have exactly one of `command` or `url`, not both"
                    .to_string(),
            )),
            (Some(command), None) => Ok(McpServerTransportConfig::Stdio {
                command: command.clone(),
                args: self.args.clone(),
                env: self.env.clone(),
            }),
            (None, Some(url)) => Ok(McpServerTransportConfig::Remote {
                url: url.clone(),
                transport: self.transport.unwrap_or_default(),
                session_id: self.session_id.clone(),
                auth: self.auth.clone(),
            }),
            (None, None) => Err(NcpError::ConfigError(
                "MCP server config must have either `command` or `url`".to_string(),
            )),
        }
    }
}

/// A named collection of [`McpServerConfig`]s plus free-form metadata. Exactly
/// one profile is active per orchestrator (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
    #[serde(flatten)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// `SHA-256( JSON(profile.mcpServers) with keys sorted )` (spec.md §3's
/// `profileHash` invariant).
pub fn profile_hash(profile: &Profile) -> String {
    let mut entries: Vec<(&String, &McpServerConfig)> = profile.mcp_servers.iter().collect();
    entries.sort_by_key(|(name, _)| name.as_str());
    let ordered: serde_json::Map<String, serde_json::Value> = entries
        .into_iter()
        .map(|(name, cfg)| {
            (
                name.clone(),
                serde_json::to_value(cfg).unwrap_or(serde_json::Value::Null),
            )
        })
        .collect();
    sha256_hex(&serde_json::Value::Object(ordered).to_string())
}

/// Per-MCP config hash used by `indexedMCPs[mcp]` (spec.md §3's second
/// invariant): hash of this one server's config, independent of its peers.
pub fn config_hash(config: &McpServerConfig) -> String {
    let value = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
    sha256_hex(&value.to_string())
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn rejects_config_with_both_command_and_url() {
        let cfg = McpServerConfig {
            command: Some("echo".to_string()),
            args: Vec::new(),
            env: HashMap::new(),
            url: Some("https://example.com".to_string()),
            transport: None,
            session_id: None,
            auth: None,
        };
        assert!(cfg.resolve().is_err());
    }

    #[test]
    fn rejects_config_with_neither_command_nor_url() {
        let cfg = McpServerConfig {
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: None,
            transport: None,
            session_id: None,
            auth: None,
        };
        assert!(cfg.resolve().is_err());
    }

    #[test]
    fn profile_hash_is_order_independent() {
        let mut a = Profile::default();
        a.mcp_servers.insert(
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
        a.mcp_servers.insert(
            "web".to_string(),
            McpServerConfig {
                command: Some("webtools".to_string()),
                args: Vec::new(),
                env: HashMap::new(),
                url: None,
                transport: None,
                session_id: None,
                auth: None,
            },
        );
        let mut b = Profile::default();
        b.mcp_servers.insert(
            "web".to_string(),
            a.mcp_servers.get("web").cloned().unwrap(),
        );
        b.mcp_servers.insert("fs".to_string(), a.mcp_servers.get("fs").cloned().unwrap());
        assert_eq!(profile_hash(&a), profile_hash(&b));
    }

    #[test]
    fn config_hash_changes_when_args_change() {
        let base = McpServerConfig {
            command: Some("echo-tools".to_string()),
            args: vec!["--a".to_string()],
            env: HashMap::new(),
            url: None,
            transport: None,
            session_id: None,
            auth: None,
        };
        let mut changed = base.clone();
        changed.args.push("--b".to_string());
        assert_ne!(config_hash(&base), config_hash(&changed));
    }
}
