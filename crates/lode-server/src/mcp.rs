//! MCP surface: one `query` tool over stdio.

use std::str::FromStr;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use schemars::JsonSchema;
use serde::Deserialize;

use lode_core::{Language, RetrievalProfile};
use lode_engine::query::{QueryEngine, QueryRequest};

/// Server-side cap on `maxResults`.
const MAX_RESULTS_LIMIT: usize = 200;

fn default_max_results() -> usize {
    50
}

/// Input parameters for the `query` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryToolInput {
    /// Repository name to query (required).
    pub repository: String,

    /// Natural-language query. Prefix with `similar:<symbol-id>` for
    /// fingerprint similarity search.
    pub query: String,

    /// Branch to query; defaults to the repository's default branch.
    pub branch: Option<String>,

    /// Restrict results to one language (e.g. "csharp", "rust").
    pub language: Option<String>,

    /// Maximum results before compaction (default: 50).
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Retrieval profile: "Fast", "Hybrid", or "Semantic".
    pub profile: Option<String>,

    /// Include related symbols and graph-aware re-ranking.
    #[serde(default)]
    pub include_related: bool,
}

/// MCP server exposing the code intelligence index.
#[derive(Clone)]
pub struct LodeMcpServer {
    engine: Arc<QueryEngine>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl LodeMcpServer {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    /// Query the code intelligence index with natural language. Finds
    /// symbols, code snippets, relations (callers/implementations), and
    /// similar code across the tracked repositories.
    #[tool(name = "query")]
    async fn query(
        &self,
        params: Parameters<QueryToolInput>,
    ) -> Result<CallToolResult, McpError> {
        let input = params.0;

        let language = match &input.language {
            Some(raw) => match Language::from_str(&raw.to_lowercase()) {
                Ok(lang) => Some(lang),
                Err(_) => {
                    return Err(McpError::invalid_params(
                        format!("unknown language: {raw}"),
                        None,
                    ))
                }
            },
            None => None,
        };

        let profile = match &input.profile {
            Some(raw) => match RetrievalProfile::from_str(raw) {
                Ok(profile) => Some(profile),
                Err(_) => {
                    return Err(McpError::invalid_params(
                        format!("unknown profile: {raw}"),
                        None,
                    ))
                }
            },
            None => None,
        };

        let request = QueryRequest {
            repository: input.repository,
            query: input.query,
            branch: input.branch,
            language,
            max_results: input.max_results.min(MAX_RESULTS_LIMIT),
            profile,
            include_related: input.include_related,
        };

        let response = self.engine.query(request).await;
        let json = serde_json::to_string(&response).map_err(|e| {
            McpError::internal_error(format!("failed to serialize response: {e}"), None)
        })?;

        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[tool_handler]
impl ServerHandler for LodeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Code intelligence index over tracked Git repositories. Use the query tool \
                 with a repository name and a natural-language question: navigate to symbols, \
                 find callers and implementations, search code semantically, or pass \
                 `similar:<symbol-id>` to find structurally similar code."
                    .into(),
            ),
        }
    }
}
