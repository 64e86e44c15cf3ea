pub mod compact;
pub mod intent;
pub mod orchestrator;

pub use compact::Compactor;
pub use intent::QueryIntent;
pub use orchestrator::{QueryEngine, QueryRequest};

use serde::Serialize;

/// Envelope returned by the single `query` operation. Repository and
/// branch live only here, never per result.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub repo: String,
    pub branch: String,
    pub query: String,
    pub intent: String,
    pub total: usize,
    pub results: Vec<QueryResult>,
    pub suggestions: Vec<String>,
    pub metadata: QueryMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub file: String,
    /// Inclusive line range, rendered `"start-end"`.
    pub lines: String,
    pub score: f64,
    #[serde(rename = "type")]
    pub result_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<Vec<RelatedEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelatedEntry {
    pub relation: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    pub keywords: Vec<String>,
    pub profile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_used: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}
