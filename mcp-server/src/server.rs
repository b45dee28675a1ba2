//! The MCP endpoint NCP exposes to its own calling client (spec.md §6): a
//! stdio-transport `ServerHandler` whose tool surface is the orchestrator's
//! own meta-operations (`find`, `run`) plus native MCP `resources/read`
//! forwarding to [`ncp_core::Orchestrator::read_resource`]. Grounded on the
//! manual `ServerHandler` implementations used elsewhere in the retrieval
//! pack for servers whose tools are dispatched by name rather than generated
//! by the `#[tool_router]` macro, since the orchestrator's own API already
//! takes loosely-typed JSON parameters.

use std::sync::Arc;

use ncp_core::NcpError;
use ncp_core::Orchestrator;
use rmcp::ErrorData;
use rmcp::handler::server::ServerHandler;
use rmcp::model::CallToolRequestParam;
use rmcp::model::CallToolResult;
use rmcp::model::Content;
use rmcp::model::Implementation;
use rmcp::model::InitializeRequestParam;
use rmcp::model::InitializeResult;
use rmcp::model::ListToolsResult;
use rmcp::model::PaginatedRequestParam;
use rmcp::model::ProtocolVersion;
use rmcp::model::ReadResourceRequestParam;
use rmcp::model::ReadResourceResult;
use rmcp::model::ResourceContents;
use rmcp::model::ServerCapabilities;
use rmcp::model::ServerInfo;
use rmcp::model::Tool;
use rmcp::service::RequestContext;
use rmcp::service::RoleServer;
use serde_json::Value;
use serde_json::json;
use tracing::warn;

/// The single MCP endpoint NCP exposes to its own client. Wraps an
/// [`Orchestrator`] behind an `Arc` so `serve()` can hand out a `Clone`
/// without pinning the transport to a particular ownership shape.
#[derive(Clone)]
pub struct NcpMcpServer {
    orchestrator: Arc<Orchestrator>,
}

impl NcpMcpServer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    fn tools() -> Vec<Tool> {
        vec![
            Tool::new(
                "find",
                "Search the indexed tool catalog across every connected MCP and return the best matches, ranked by confidence. Pass an empty query to list currently healthy tools.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Natural-language search query; empty returns healthy tools."},
                        "limit": {"type": "integer", "description": "Maximum number of results (default 5)."},
                        "detailed": {"type": "boolean", "description": "Include full input schemas in the result."},
                        "confidenceThreshold": {"type": "number", "description": "Minimum confidence to include a result (default 0.35)."}
                    }
                })
                .as_object()
                .cloned()
                .unwrap_or_default(),
            ),
            Tool::new(
                "run",
                "Invoke a tool by its 'mcp:tool' identifier or bare tool name, resolving the owning MCP, validating required parameters, and dispatching the call.",
                json!({
                    "type": "object",
                    "properties": {
                        "toolIdentifier": {"type": "string", "description": "Either 'mcp:tool' or a bare tool name."},
                        "parameters": {"type": "object", "description": "Parameters forwarded to the resolved tool."},
                        "meta": {"type": "object", "description": "Optional call metadata forwarded verbatim."}
                    },
                    "required": ["toolIdentifier"]
                })
                .as_object()
                .cloned()
                .unwrap_or_default(),
            ),
        ]
    }

    async fn call_find(&self, arguments: Value) -> Result<CallToolResult, ErrorData> {
        let query = arguments.get("query").and_then(Value::as_str).unwrap_or("");
        let limit = arguments
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(0);
        let detailed = arguments.get("detailed").and_then(Value::as_bool).unwrap_or(false);
        let confidence_threshold = arguments
            .get("confidenceThreshold")
            .and_then(Value::as_f64)
            .unwrap_or(0.35);

        let results = self.orchestrator.find(query, limit, detailed, confidence_threshold).await;
        let payload = json!({
            "results": results.into_iter().map(|r| json!({
                "tool": r.prefixed_name,
                "mcp": r.mcp_name,
                "toolName": r.tool_name,
                "description": r.description,
                "confidence": r.confidence,
            })).collect::<Vec<_>>(),
        });
        Ok(CallToolResult {
            content: vec![Content::text(payload.to_string())],
            structured_content: Some(payload),
            is_error: None,
            meta: None,
        })
    }

    async fn call_run(&self, arguments: Value) -> Result<CallToolResult, ErrorData> {
        let Some(tool_identifier) = arguments.get("toolIdentifier").and_then(Value::as_str) else {
            return Ok(CallToolResult {
                content: vec![Content::text("Missing required parameters: toolIdentifier")],
                structured_content: None,
                is_error: Some(true),
                meta: None,
            });
        };
        let parameters = arguments.get("parameters").cloned().unwrap_or_else(|| json!({}));
        let meta = arguments.get("meta").cloned();

        match self.orchestrator.run(tool_identifier, parameters, meta).await {
            Ok(success) => {
                let content = success
                    .content
                    .into_iter()
                    .map(content_block_to_rmcp)
                    .collect::<Vec<_>>();
                Ok(CallToolResult {
                    content,
                    structured_content: None,
                    is_error: None,
                    meta: None,
                })
            }
            Err(err) => Ok(CallToolResult {
                content: vec![Content::text(err.to_run_failure_message(self.orchestrator.is_debug()))],
                structured_content: None,
                is_error: Some(true),
                meta: None,
            }),
        }
    }

    /// Serves this handler over stdio until the client disconnects (spec.md
    /// §6's `serve` entry point). Mirrors the retrieval pack's own
    /// `(stdin, stdout) -> serve -> waiting` stdio transport shape.
    pub async fn run(self) -> anyhow::Result<()> {
        use rmcp::ServiceExt;
        let transport = (tokio::io::stdin(), tokio::io::stdout());
        self.serve(transport).await?.waiting().await?;
        Ok(())
    }
}

/// `mcp_types::ContentBlock` is the wire shape this crate's own client side
/// speaks; `rmcp::model::Content` is what the server half of the same `rmcp`
/// crate wants back. Only `Text` round-trips losslessly here — images and
/// embedded resources degrade to their textual description, which matches
/// how `orchestrator::extract_text` already treats non-text blocks.
fn content_block_to_rmcp(block: mcp_types::ContentBlock) -> Content {
    match block {
        mcp_types::ContentBlock::Text { text } => Content::text(text),
        mcp_types::ContentBlock::Image { mime_type, .. } => {
            Content::text(format!("[image content, mime type {mime_type}]"))
        }
        mcp_types::ContentBlock::Resource { resource } => {
            Content::text(resource.text.unwrap_or_default())
        }
    }
}

impl ServerHandler for NcpMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "ncp".into(),
                title: None,
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Aggregates tools across every configured MCP server behind two operations: \
                 `find` to search the catalog and `run` to invoke a resolved tool."
                    .to_string(),
            ),
        }
    }

    /// spec.md §4.10's `triggerAutoImport(clientName)` hook: fired once the
    /// handshake's client identity is known. Indexing newly-discovered MCPs
    /// can take up to the slow-probe timeout, so this runs in the background
    /// rather than delaying the `initialize` response.
    async fn initialize(
        &self,
        request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, ErrorData> {
        let client_name = request.client_info.name.clone();
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            if let Err(err) = orchestrator.trigger_auto_import(&client_name).await {
                warn!(client = %client_name, error = %err, "auto-import after client handshake failed");
            }
        });
        Ok(self.get_info())
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or_else(|| json!({}));
        match request.name.as_ref() {
            "find" => self.call_find(arguments).await,
            "run" => self.call_run(arguments).await,
            other => Err(ErrorData::invalid_params(
                format!("unknown tool '{other}'"),
                None,
            )),
        }
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        match self.orchestrator.read_resource(&request.uri).await {
            Ok(text) => Ok(ReadResourceResult {
                contents: vec![ResourceContents::TextResourceContents {
                    uri: request.uri,
                    mime_type: None,
                    text,
                }],
            }),
            Err(err @ NcpError::McpNotFound { .. }) => {
                Err(ErrorData::invalid_params(err.to_string(), None))
            }
            Err(err) => Err(ErrorData::internal_error(err.to_string(), None)),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn tool_list_names_match_the_call_tool_dispatch() {
        let names: Vec<&str> = NcpMcpServer::tools().iter().map(|t| t.name.as_ref()).collect();
        assert_eq!(names, vec!["find", "run"]);
    }
}
