use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ── ID types ──
pub type RepoId = Uuid;
pub type BranchId = Uuid;
pub type SymbolId = Uuid;
pub type ChunkId = Uuid;
pub type JobId = Uuid;

// ── Span ──

/// Source location of a symbol. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

// ── Language ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    CSharp,
    JavaScript,
    TypeScript,
    Python,
    Java,
    Go,
    Rust,
    Ruby,
    Shell,
    Json,
    Yaml,
    Toml,
    Html,
    Css,
    Markdown,
    Sql,
    Unknown,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CSharp => "csharp",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Ruby => "ruby",
            Self::Shell => "shell",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Html => "html",
            Self::Css => "css",
            Self::Markdown => "markdown",
            Self::Sql => "sql",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csharp" => Ok(Self::CSharp),
            "javascript" => Ok(Self::JavaScript),
            "typescript" => Ok(Self::TypeScript),
            "python" => Ok(Self::Python),
            "java" => Ok(Self::Java),
            "go" => Ok(Self::Go),
            "rust" => Ok(Self::Rust),
            "ruby" => Ok(Self::Ruby),
            "shell" => Ok(Self::Shell),
            "json" => Ok(Self::Json),
            "yaml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "html" => Ok(Self::Html),
            "css" => Ok(Self::Css),
            "markdown" => Ok(Self::Markdown),
            "sql" => Ok(Self::Sql),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown Language: {other}")),
        }
    }
}

// ── Symbol ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Namespace,
    Class,
    Interface,
    Struct,
    Enum,
    Method,
    Function,
    Constructor,
    Property,
    Field,
    Variable,
    Parameter,
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Namespace => "namespace",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Method => "method",
            Self::Function => "function",
            Self::Constructor => "constructor",
            Self::Property => "property",
            Self::Field => "field",
            Self::Variable => "variable",
            Self::Parameter => "parameter",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "namespace" => Ok(Self::Namespace),
            "class" => Ok(Self::Class),
            "interface" => Ok(Self::Interface),
            "struct" => Ok(Self::Struct),
            "enum" => Ok(Self::Enum),
            "method" => Ok(Self::Method),
            "function" => Ok(Self::Function),
            "constructor" => Ok(Self::Constructor),
            "property" => Ok(Self::Property),
            "field" => Ok(Self::Field),
            "variable" => Ok(Self::Variable),
            "parameter" => Ok(Self::Parameter),
            other => Err(format!("unknown SymbolKind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub repo_id: RepoId,
    pub branch_name: String,
    pub file_path: String,
    pub commit_sha: String,
    pub name: String,
    pub qualified_name: Option<String>,
    pub kind: SymbolKind,
    pub language: Language,
    pub span: Span,
    pub signature: Option<String>,
    pub documentation: Option<String>,
    pub modifiers: Vec<String>,
    /// Back reference to the enclosing symbol; never ownership.
    pub parent_symbol_id: Option<SymbolId>,
}

// ── Edge ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Calls,
    Inherits,
    Implements,
    TypeOf,
    Returns,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Calls => "calls",
            Self::Inherits => "inherits",
            Self::Implements => "implements",
            Self::TypeOf => "type_of",
            Self::Returns => "returns",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calls" => Ok(Self::Calls),
            "inherits" => Ok(Self::Inherits),
            "implements" => Ok(Self::Implements),
            "type_of" => Ok(Self::TypeOf),
            "returns" => Ok(Self::Returns),
            other => Err(format!("unknown EdgeKind: {other}")),
        }
    }
}

/// A resolved, persisted edge between two symbols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: Uuid,
    pub repo_id: RepoId,
    pub branch_name: String,
    pub commit_sha: String,
    pub source_symbol_id: SymbolId,
    pub target_symbol_id: SymbolId,
    pub kind: EdgeKind,
}

/// Raw edge as emitted by a parser: the target is a qualified-name string
/// (or already a symbol id rendered as a UUID) until resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEdge {
    pub source_symbol_id: SymbolId,
    pub target: String,
    pub kind: EdgeKind,
}

// ── Repository / Branch / Commit / File ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepoId,
    pub name: String,
    pub remote_url: String,
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Stale,
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stale => "stale",
        };
        write!(f, "{s}")
    }
}

impl FromStr for IndexState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "stale" => Ok(Self::Stale),
            other => Err(format!("unknown IndexState: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub repo_id: RepoId,
    pub name: String,
    pub head_commit_sha: String,
    pub indexed_commit_sha: Option<String>,
    pub index_state: IndexState,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: Uuid,
    pub repo_id: RepoId,
    pub sha: String,
    pub branch_name: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub committed_at: Option<DateTime<Utc>>,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub repo_id: RepoId,
    pub branch_name: String,
    pub file_path: String,
    pub commit_sha: String,
    pub language: Language,
    pub size_bytes: i64,
    pub line_count: i32,
}

// ── Chunk / Embedding / Fingerprint ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChunk {
    pub id: ChunkId,
    pub repo_id: RepoId,
    pub branch_name: String,
    pub file_path: String,
    pub symbol_id: Option<SymbolId>,
    pub symbol_name: String,
    pub symbol_kind: SymbolKind,
    pub language: Language,
    pub content: String,
    pub chunk_start_line: u32,
    pub chunk_end_line: u32,
    pub symbol_start_line: u32,
    pub symbol_end_line: u32,
    pub token_count: i32,
    pub parent_symbol_name: Option<String>,
    pub signature: Option<String>,
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub id: Uuid,
    pub chunk_id: ChunkId,
    pub repo_id: RepoId,
    pub branch_name: String,
    pub commit_sha: String,
    pub vector: Vec<f32>,
    pub model: String,
    pub model_version: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// SimHash fingerprint of a symbol's token bag plus the four 16-bit band
/// bucket keys used for candidate generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolFingerprint {
    pub symbol_id: SymbolId,
    pub repo_id: RepoId,
    pub branch_name: String,
    pub language: Language,
    pub kind: SymbolKind,
    pub fingerprint_kind: String,
    pub fingerprint: u64,
    pub bands: [u16; 4],
}

/// Lexical search document for one symbol. Token columns feed the stored
/// `search_vector`; the snippet is what search results display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSearchDoc {
    pub symbol_id: SymbolId,
    pub repo_id: RepoId,
    pub branch_name: String,
    pub commit_sha: String,
    pub file_path: String,
    pub kind: SymbolKind,
    pub language: Language,
    pub name_tokens: String,
    pub qualified_tokens: String,
    pub signature_tokens: String,
    pub documentation_tokens: String,
    pub literal_tokens: String,
    pub snippet: String,
}

// ── Embedding jobs ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        };
        write!(f, "{s}")
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("unknown JobStatus: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingJob {
    pub id: JobId,
    pub repo_id: RepoId,
    pub branch_name: String,
    pub commit_sha: String,
    pub target_kind: String,
    pub target_id: Uuid,
    pub model: String,
    pub dims: Option<i32>,
    pub status: JobStatus,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

// ── Retrieval profile ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetrievalProfile {
    /// Symbol-first lexical search, no embedding calls.
    Fast,
    /// Lexical plus embeddings when the provider is available.
    Hybrid,
    /// Embeddings-first with lexical fallback.
    Semantic,
}

impl std::fmt::Display for RetrievalProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Fast => "fast",
            Self::Hybrid => "hybrid",
            Self::Semantic => "semantic",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RetrievalProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "hybrid" => Ok(Self::Hybrid),
            "semantic" => Ok(Self::Semantic),
            other => Err(format!("unknown RetrievalProfile: {other}")),
        }
    }
}

// ── Change detection ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    /// Populated for renames; the previous path whose rows must be removed.
    pub old_path: Option<String>,
    pub kind: ChangeKind,
}

// ── Parser output ──

/// Everything a parser extracted from one file. Parsers never fail the
/// batch; a failed parse carries `success = false` and the error message
/// with empty symbols and edges.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub repo_id: RepoId,
    pub branch_name: String,
    pub commit_sha: String,
    pub file_path: String,
    pub language: Language,
    pub symbols: Vec<Symbol>,
    pub edges: Vec<RawEdge>,
    pub source_text: String,
    pub success: bool,
    pub error: Option<String>,
}
