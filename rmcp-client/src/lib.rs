//! Transport Factory (C1) and MCP Client Wrapper (C2).
//!
//! [`RmcpClient`] is the only thing `ncp-core`'s connection pool talks to: it
//! hides whether a given downstream server is a spawned stdio child process,
//! an SSE endpoint, or a streamable-HTTP endpoint behind one small async API,
//! built on top of the real `rmcp` MCP client library.

mod auth;
mod client;
mod runtime;
mod token_store;

pub use auth::AuthConfig;
pub use auth::build_auth_headers;
pub use client::RmcpClient;
pub use runtime::resolve_stdio_command;
pub use token_store::TokenStore;

/// Environment variables NCP sets on every spawned stdio child so that
/// well-behaved MCP servers stay quiet on stdout (spec.md §4.1).
pub const SILENCING_ENV_VARS: [(&str, &str); 3] = [
    ("MCP_SILENT", "true"),
    ("QUIET", "true"),
    ("NO_COLOR", "true"),
];

/// Reconnection policy streamable-HTTP clients use (spec.md §4.1).
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub initial_delay: std::time::Duration,
    pub growth_factor: f64,
    pub max_delay: std::time::Duration,
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: std::time::Duration::from_secs(1),
            growth_factor: 1.5,
            max_delay: std::time::Duration::from_secs(30),
            max_retries: 5,
        }
    }
}
