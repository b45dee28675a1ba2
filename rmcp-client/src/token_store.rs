//! Persists OAuth tokens for a downstream MCP server in the platform
//! keychain via `keyring`, so a device-flow login survives across NCP runs.

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

const SERVICE: &str = "ncp-mcp-oauth";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds; `None` means the token does not expire.
    pub expires_at: Option<i64>,
}

/// Keyring-backed store, keyed by the MCP server's name within a profile.
pub struct TokenStore {
    account: String,
}

impl TokenStore {
    pub fn new(server_name: &str) -> Self {
        Self {
            account: server_name.to_string(),
        }
    }

    pub fn load(&self) -> Result<Option<StoredToken>> {
        let entry = keyring::Entry::new(SERVICE, &self.account)
            .context("opening keyring entry for MCP OAuth token")?;
        match entry.get_password() {
            Ok(raw) => {
                let token = serde_json::from_str(&raw).context("decoding stored OAuth token")?;
                Ok(Some(token))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err).context("reading MCP OAuth token from keyring"),
        }
    }

    pub fn store(&self, token: &StoredToken) -> Result<()> {
        let entry = keyring::Entry::new(SERVICE, &self.account)
            .context("opening keyring entry for MCP OAuth token")?;
        let raw = serde_json::to_string(token).context("encoding OAuth token")?;
        entry
            .set_password(&raw)
            .context("writing MCP OAuth token to keyring")
    }

    pub fn clear(&self) -> Result<()> {
        let entry = keyring::Entry::new(SERVICE, &self.account)
            .context("opening keyring entry for MCP OAuth token")?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err).context("clearing MCP OAuth token from keyring"),
        }
    }
}

impl StoredToken {
    pub fn is_expired(&self, now_unix: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now_unix >= expires_at,
            None => false,
        }
    }
}
