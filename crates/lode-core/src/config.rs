use serde::{Deserialize, Serialize};

use crate::types::RetrievalProfile;

/// Runtime configuration for the whole engine. Assembled once (from flags
/// and environment in the server binary) and passed to component
/// constructors; there are no globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub git: GitConfig,
    pub indexing: IndexingConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub jobs: JobsConfig,
    pub response: ResponseConfig,
    pub default_profile: RetrievalProfile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            git: GitConfig::default(),
            indexing: IndexingConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            jobs: JobsConfig::default(),
            response: ResponseConfig::default(),
            default_profile: RetrievalProfile::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Root directory for per-repository working trees.
    pub working_directory: std::path::PathBuf,
    /// Branches untouched for this many days are dropped from the in-memory
    /// tracker (the default branch never is).
    pub stale_branch_days: i64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            working_directory: std::path::PathBuf::from("./data/repos"),
            stale_branch_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Concurrent blob-read + parse permits per batch.
    pub file_read_concurrency: usize,
    /// Files larger than this are skipped outright.
    pub max_file_bytes: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            file_read_concurrency: 8,
            max_file_bytes: 1_048_576,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub context_lines_before: u32,
    pub context_lines_after: u32,
    /// Hard cap on chunk content; ~7.5k tokens, safely under the provider's
    /// 8k context.
    pub max_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            context_lines_before: 5,
            context_lines_after: 5,
            max_chunk_chars: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    pub service_url: String,
    pub model: String,
    pub batch_size: usize,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_url: "http://localhost:8900".to_string(),
            model: "jina-embeddings-v2-base-code".to_string(),
            batch_size: 32,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub batch_size: i64,
    pub max_attempts: i32,
    /// Lease length: in-progress jobs older than this are requeued.
    pub stale_minutes: i64,
    pub poll_interval_seconds: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            max_attempts: 5,
            stale_minutes: 15,
            poll_interval_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    pub max_results: usize,
    pub max_snippet_chars: usize,
    pub max_json_bytes: usize,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_results: 10,
            max_snippet_chars: 8_000,
            max_json_bytes: 16_384,
        }
    }
}
