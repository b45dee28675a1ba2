//! Profile loading. spec.md §1 scopes the profile file format itself out as
//! an external collaborator ("the profile file loader"); this module only
//! owns reading the on-disk JSON into the [`Profile`] shape `core` already
//! defines in [`crate::config_types`], the way `paths::NcpPaths` resolves
//! every other on-disk location.

use std::path::Path;

use anyhow::Context;
use anyhow::Result;

use crate::config_types::Profile;
use crate::error::NcpError;
use crate::paths::NcpPaths;

/// Loads `<base>/profiles/<name>.json`. A missing file is a [`NcpError::ConfigError`]
/// rather than a silently empty profile: an orchestrator with no profile at
/// all has nothing to index and nothing to route to.
pub fn load_profile(paths: &NcpPaths, name: &str) -> Result<Profile, NcpError> {
    let path = paths.profile_path(name);
    load_profile_from_path(&path)
}

pub fn load_profile_from_path(path: &Path) -> Result<Profile, NcpError> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        NcpError::ConfigError(format!("reading profile {}: {err}", path.display()))
    })?;
    serde_json::from_str(&raw).map_err(|err| {
        NcpError::ConfigError(format!("parsing profile {}: {err}", path.display()))
    })
}

/// Writes a profile back to disk. Not part of the hard core's read path, but
/// `triggerAutoImport` (spec.md §4.10) needs somewhere to persist newly
/// discovered MCPs; the out-of-scope profile manager owns the merge logic,
/// this is just the atomic write primitive.
pub fn save_profile(paths: &NcpPaths, name: &str, profile: &Profile) -> Result<()> {
    let path = paths.profile_path(name);
    crate::cache::csv_cache::atomic_write_json(&path, profile)
        .with_context(|| format!("writing profile {}", path.display()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::config_types::McpServerConfig;
    use std::collections::HashMap;

    #[test]
    fn missing_profile_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let err = load_profile(&paths, "default").unwrap_err();
        assert!(matches!(err, NcpError::ConfigError(_)));
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
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
        save_profile(&paths, "default", &profile).unwrap();
        let loaded = load_profile(&paths, "default").unwrap();
        assert!(loaded.mcp_servers.contains_key("fs"));
    }
}
