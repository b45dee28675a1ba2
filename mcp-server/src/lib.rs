//! `ncp-mcp-server`: the single MCP endpoint NCP exposes to its own client
//! (spec.md §6 — "the orchestrator speaks MCP on its client-facing side"),
//! plus the scheduler's single-task and single-timing worker entry points
//! (spec.md §4.14). Grounded on the teacher's `mcp-server` crate (a
//! `serve` subcommand wrapping an MCP client library's server half) and on
//! the `#[rmcp::tool_router]` / `ServerHandler` shape used elsewhere in the
//! retrieval pack for exposing a small, hand-written tool surface.

pub mod server;
pub mod worker;

pub use server::NcpMcpServer;
pub use worker::TaskExecuteOutcome;
pub use worker::run_task_execute;
pub use worker::run_timing_fire;
