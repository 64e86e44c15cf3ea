mod mcp;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use lode_core::config::{
    ChunkingConfig, Config, EmbeddingConfig, GitConfig, IndexingConfig, JobsConfig, ResponseConfig,
};
use lode_core::RetrievalProfile;
use lode_engine::cleanup::BranchCleanup;
use lode_engine::embed::{EmbeddingProvider, EmbeddingWorker};
use lode_engine::git::GitTracker;
use lode_engine::indexer::Indexer;
use lode_engine::query::QueryEngine;
use lode_engine::store::Store;

use mcp::LodeMcpServer;

#[derive(Parser)]
#[command(name = "lode-server", about = "Lodestone — code intelligence index over Git repositories")]
struct Cli {
    // ── database ──
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    db_host: String,
    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    db_port: u16,
    #[arg(long, env = "DB_NAME", default_value = "lodestone")]
    db_name: String,
    #[arg(long, env = "DB_USER", default_value = "lodestone")]
    db_user: String,
    #[arg(long, env = "DB_PASSWORD", default_value = "")]
    db_password: String,

    // ── tracked repositories ──
    /// Comma-separated `name=remote_url[#branch]` entries to track.
    #[arg(long, env = "REPOSITORIES", default_value = "")]
    repositories: String,
    /// Seconds between background index sweeps over tracked repositories.
    #[arg(long, env = "INDEX_INTERVAL_SECONDS", default_value_t = 300)]
    index_interval_seconds: u64,

    // ── git ──
    #[arg(long, env = "WORKING_DIRECTORY", default_value = "./data/repos")]
    working_directory: PathBuf,
    #[arg(long, env = "STALE_BRANCH_DAYS", default_value_t = 30)]
    stale_branch_days: i64,

    // ── indexing ──
    #[arg(long, env = "FILE_READ_CONCURRENCY", default_value_t = 8)]
    file_read_concurrency: usize,
    #[arg(long, env = "MAX_FILE_BYTES", default_value_t = 1_048_576)]
    max_file_bytes: u64,

    // ── chunking ──
    #[arg(long, env = "CHUNK_CONTEXT_LINES_BEFORE", default_value_t = 5)]
    chunk_context_lines_before: u32,
    #[arg(long, env = "CHUNK_CONTEXT_LINES_AFTER", default_value_t = 5)]
    chunk_context_lines_after: u32,
    #[arg(long, env = "MAX_CHUNK_CHARS", default_value_t = 30_000)]
    max_chunk_chars: usize,

    // ── embeddings ──
    #[arg(long, env = "EMBEDDINGS_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    embeddings_enabled: bool,
    #[arg(long, env = "EMBEDDING_SERVICE_URL", default_value = "http://localhost:8900")]
    embedding_service_url: String,
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "jina-embeddings-v2-base-code")]
    embedding_model: String,
    #[arg(long, env = "EMBEDDING_BATCH_SIZE", default_value_t = 32)]
    embedding_batch_size: usize,
    #[arg(long, env = "EMBEDDING_TIMEOUT_SECONDS", default_value_t = 30)]
    embedding_timeout_seconds: u64,

    // ── embedding jobs ──
    #[arg(long, env = "EMBEDDING_JOBS_BATCH_SIZE", default_value_t = 16)]
    embedding_jobs_batch_size: i64,
    #[arg(long, env = "EMBEDDING_JOBS_MAX_ATTEMPTS", default_value_t = 5)]
    embedding_jobs_max_attempts: i32,
    #[arg(long, env = "EMBEDDING_JOBS_STALE_MINUTES", default_value_t = 15)]
    embedding_jobs_stale_minutes: i64,

    // ── response caps ──
    #[arg(long, env = "MAX_RESPONSE_RESULTS", default_value_t = 10)]
    max_response_results: usize,
    #[arg(long, env = "MAX_RESPONSE_SNIPPET_CHARS", default_value_t = 8_000)]
    max_response_snippet_chars: usize,
    #[arg(long, env = "MAX_RESPONSE_BYTES", default_value_t = 16_384)]
    max_response_bytes: usize,

    #[arg(long, env = "DEFAULT_RETRIEVAL_PROFILE", default_value = "hybrid")]
    default_retrieval_profile: String,
}

impl Cli {
    fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_user, self.db_password, self.db_host, self.db_port, self.db_name
        )
    }

    fn to_config(&self) -> Result<Config> {
        let default_profile = RetrievalProfile::from_str(&self.default_retrieval_profile)
            .map_err(|e| anyhow::anyhow!(e))?;

        Ok(Config {
            git: GitConfig {
                working_directory: self.working_directory.clone(),
                stale_branch_days: self.stale_branch_days,
            },
            indexing: IndexingConfig {
                file_read_concurrency: self.file_read_concurrency,
                max_file_bytes: self.max_file_bytes,
            },
            chunking: ChunkingConfig {
                context_lines_before: self.chunk_context_lines_before,
                context_lines_after: self.chunk_context_lines_after,
                max_chunk_chars: self.max_chunk_chars,
            },
            embedding: EmbeddingConfig {
                enabled: self.embeddings_enabled,
                service_url: self.embedding_service_url.clone(),
                model: self.embedding_model.clone(),
                batch_size: self.embedding_batch_size,
                timeout_seconds: self.embedding_timeout_seconds,
            },
            jobs: JobsConfig {
                batch_size: self.embedding_jobs_batch_size,
                max_attempts: self.embedding_jobs_max_attempts,
                stale_minutes: self.embedding_jobs_stale_minutes,
                poll_interval_seconds: 5,
            },
            response: ResponseConfig {
                max_results: self.max_response_results,
                max_snippet_chars: self.max_response_snippet_chars,
                max_json_bytes: self.max_response_bytes,
            },
            default_profile,
        })
    }
}

/// One tracked repository parsed from the `REPOSITORIES` setting.
#[derive(Debug, Clone)]
struct TrackedRepo {
    name: String,
    remote_url: String,
    branch: Option<String>,
}

fn parse_repositories(raw: &str) -> Vec<TrackedRepo> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let (name, rest) = entry.split_once('=')?;
            let (url, branch) = match rest.rsplit_once('#') {
                Some((url, branch)) => (url, Some(branch.to_string())),
                None => (rest, None),
            };
            Some(TrackedRepo {
                name: name.trim().to_string(),
                remote_url: url.trim().to_string(),
                branch,
            })
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lode=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.to_config()?;

    tracing::info!("connecting to database at {}:{}", cli.db_host, cli.db_port);
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&cli.database_url())
        .await?;

    tracing::info!("running migrations");
    sqlx::migrate!("../lode-engine/migrations").run(&pool).await?;

    tokio::fs::create_dir_all(&config.git.working_directory).await?;

    let store = Store::new(pool);
    let tracker = Arc::new(GitTracker::new(config.git.clone(), store.repos.clone()));
    let provider = Arc::new(EmbeddingProvider::new(config.embedding.clone()));

    if provider.enabled() {
        if provider.healthy().await {
            match provider.info().await {
                Some(info) => tracing::info!(
                    model = %info.model,
                    dims = info.dims,
                    "embedding provider online"
                ),
                None => tracing::warn!("embedding provider healthy but /info unavailable"),
            }
        } else {
            tracing::warn!("embedding provider not reachable; degrading to lexical search");
        }
    } else {
        tracing::info!("embeddings disabled");
    }

    let indexer = Arc::new(Indexer::new(
        config.clone(),
        store.clone(),
        Arc::clone(&tracker),
        Arc::clone(&provider),
    ));
    let engine = Arc::new(QueryEngine::new(
        store.clone(),
        Arc::clone(&provider),
        &config,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = EmbeddingWorker::new(store.clone(), Arc::clone(&provider), config.jobs.clone());
    let worker_shutdown = shutdown_rx.clone();
    tokio::spawn(async move { worker.run(worker_shutdown).await });

    let cleanup = BranchCleanup::new(Arc::clone(&tracker));
    let cleanup_shutdown = shutdown_rx.clone();
    tokio::spawn(async move { cleanup.run(cleanup_shutdown).await });

    let tracked = parse_repositories(&cli.repositories);
    if !tracked.is_empty() {
        let indexer = Arc::clone(&indexer);
        let mut index_shutdown = shutdown_rx.clone();
        let interval_secs = cli.index_interval_seconds;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        for repo in &tracked {
                            let branch = repo.branch.as_deref().unwrap_or("main");
                            if let Err(e) = indexer
                                .index_branch(&repo.name, &repo.remote_url, branch)
                                .await
                            {
                                tracing::warn!(repo = %repo.name, branch, "index sweep failed: {e}");
                            }
                        }
                    }
                    _ = index_shutdown.changed() => {
                        if *index_shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }

    tracing::info!("serving MCP over stdio");
    let server = LodeMcpServer::new(engine);
    let service = rmcp::ServiceExt::serve(server, rmcp::transport::stdio()).await?;
    service.waiting().await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}
