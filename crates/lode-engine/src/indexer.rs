//! Indexing orchestrator.
//!
//! Drives one `(repo, branch)` batch end to end: change detection → blob
//! read → language detection → parse (bounded concurrency) → chunk →
//! up-front embedding → one transaction that replaces the affected files'
//! rows, resolves edges, and enqueues embedding jobs for whatever the
//! up-front pass could not cover. Nothing becomes visible to queries
//! until the transaction commits; `indexed_commit_sha` advances only
//! after it has.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use lode_core::config::Config;
use lode_core::{
    ChangeKind, CodeChunk, Commit, Embedding, EmbeddingJob, Error, FileChange, FileRecord,
    IndexState, JobStatus, Language, ParsedFile, Repository, Result, Symbol, SymbolFingerprint,
    SymbolSearchDoc,
};

use crate::chunker::Chunker;
use crate::embed::EmbeddingProvider;
use crate::git::GitTracker;
use crate::language;
use crate::parser::{ParseContext, ParserRegistry};
use crate::resolver::EdgeResolver;
use crate::store::{ChunkStore, EdgeStore, EmbeddingStore, FingerprintStore, JobStore, RepoStore, SearchStore, Store, SymbolStore};
use crate::text::{Fingerprint, Tokenizer};
use crate::workspace::WorkspaceLoader;

pub const FINGERPRINT_KIND: &str = "simhash_v1";

/// Counters from one indexing batch.
#[derive(Debug, Default, Clone)]
pub struct IndexSummary {
    pub files_indexed: usize,
    pub files_deleted: usize,
    pub parse_failures: usize,
    pub symbols: usize,
    pub chunks: usize,
    pub edges_resolved: usize,
    pub edges_discarded: usize,
    pub embeddings_written: usize,
    pub jobs_enqueued: usize,
}

pub struct Indexer {
    config: Config,
    store: Store,
    tracker: Arc<GitTracker>,
    registry: Arc<ParserRegistry>,
    chunker: Chunker,
    workspaces: Arc<WorkspaceLoader>,
    provider: Arc<EmbeddingProvider>,
}

impl Indexer {
    pub fn new(
        config: Config,
        store: Store,
        tracker: Arc<GitTracker>,
        provider: Arc<EmbeddingProvider>,
    ) -> Self {
        let chunker = Chunker::new(config.chunking.clone());
        Self {
            config,
            store,
            tracker,
            registry: Arc::new(ParserRegistry::new()),
            chunker,
            workspaces: Arc::new(WorkspaceLoader::new()),
            provider,
        }
    }

    /// Bring one branch up to date: fetch, diff against the last indexed
    /// commit, and index the changed files. No-op when already current.
    pub async fn index_branch(
        &self,
        repo_name: &str,
        remote_url: &str,
        branch_name: &str,
    ) -> Result<IndexSummary> {
        let repo = self
            .tracker
            .ensure_repository(repo_name, remote_url, branch_name)
            .await?;
        let branch = self.tracker.ensure_branch(&repo, branch_name).await?;

        if branch.index_state == IndexState::Completed
            && branch.indexed_commit_sha.as_deref() == Some(branch.head_commit_sha.as_str())
        {
            tracing::debug!(repo = repo_name, branch = branch_name, "index already current");
            return Ok(IndexSummary::default());
        }

        let changes = self.tracker.changes(&repo, branch_name).await?;
        if changes.is_empty() {
            self.tracker.mark_indexed(&repo, branch_name).await?;
            return Ok(IndexSummary::default());
        }

        self.store
            .repos
            .set_index_state(repo.id, branch_name, IndexState::InProgress)
            .await?;

        let result = self
            .index_files(&repo, branch_name, &branch.head_commit_sha, changes)
            .await;

        match result {
            Ok(summary) => {
                self.tracker.mark_indexed(&repo, branch_name).await?;
                tracing::info!(
                    repo = repo_name,
                    branch = branch_name,
                    files = summary.files_indexed,
                    symbols = summary.symbols,
                    "index completed"
                );
                Ok(summary)
            }
            Err(e) => {
                self.store
                    .repos
                    .set_index_state(repo.id, branch_name, IndexState::Failed)
                    .await?;
                Err(e)
            }
        }
    }

    /// Index a batch of file changes for one `(repo, branch)` at one
    /// commit.
    pub async fn index_files(
        &self,
        repo: &Repository,
        branch_name: &str,
        commit_sha: &str,
        changes: Vec<FileChange>,
    ) -> Result<IndexSummary> {
        let mut summary = IndexSummary::default();

        // Paths whose existing rows must be removed: every changed path,
        // plus the old path of a rename.
        let mut delete_paths: Vec<String> = Vec::new();
        let mut to_parse: Vec<FileChange> = Vec::new();
        for change in changes {
            if let Some(old) = &change.old_path {
                delete_paths.push(old.clone());
            }
            delete_paths.push(change.path.clone());
            match change.kind {
                ChangeKind::Deleted => summary.files_deleted += 1,
                _ => to_parse.push(change),
            }
        }

        // Semantic analysis wants project context when C# files are in the
        // batch.
        let _workspace = if to_parse.iter().any(|c| {
            language::detect(&c.path, None) == Language::CSharp
        }) {
            self.workspaces
                .acquire(&self.tracker.repo_path(repo), branch_name)
                .await
        } else {
            None
        };

        let parsed_files = self
            .read_and_parse(repo, branch_name, commit_sha, to_parse)
            .await?;
        summary.parse_failures = parsed_files.iter().filter(|p| !p.success).count();

        // Chunk everything up front; the chunker is pure CPU.
        let mut all_chunks: Vec<CodeChunk> = Vec::new();
        for parsed in parsed_files.iter().filter(|p| p.success) {
            all_chunks.extend(self.chunker.chunk_file(parsed));
        }

        // Best-effort up-front embeddings; failures leave jobs for the
        // worker.
        let vectors = self.embed_upfront(&all_chunks).await;
        summary.embeddings_written = vectors.len();

        let commit_meta = self.tracker.commit_meta(repo, commit_sha).await.ok();

        // ── single transaction ──
        let mut tx = self.store.begin().await?;

        for path in &delete_paths {
            SymbolStore::delete_by_file(&mut tx, repo.id, branch_name, path).await?;
            ChunkStore::delete_by_file(&mut tx, repo.id, branch_name, path).await?;
            sqlx::query(
                "DELETE FROM files WHERE repo_id = $1 AND branch_name = $2 AND file_path = $3",
            )
            .bind(repo.id)
            .bind(branch_name)
            .bind(path)
            .execute(&mut *tx)
            .await?;
        }

        RepoStore::insert_commit(
            &mut tx,
            &Commit {
                id: Uuid::new_v4(),
                repo_id: repo.id,
                sha: commit_sha.to_string(),
                branch_name: branch_name.to_string(),
                author_name: commit_meta.as_ref().and_then(|m| m.author_name.clone()),
                author_email: commit_meta.as_ref().and_then(|m| m.author_email.clone()),
                committed_at: commit_meta.as_ref().and_then(|m| m.committed_at),
                indexed_at: Utc::now(),
            },
        )
        .await?;

        let mut all_symbols: Vec<Symbol> = Vec::new();
        let mut all_raw_edges = Vec::new();
        for parsed in &parsed_files {
            if !parsed.success {
                continue;
            }
            summary.files_indexed += 1;

            insert_file_record(&mut tx, repo, branch_name, commit_sha, parsed).await?;
            SymbolStore::insert_batch(&mut tx, &parsed.symbols).await?;

            let fingerprints = build_fingerprints(parsed);
            FingerprintStore::insert_batch(&mut tx, &fingerprints).await?;

            let docs = build_search_docs(parsed);
            SearchStore::insert_batch(&mut tx, &docs).await?;

            all_symbols.extend(parsed.symbols.iter().cloned());
            all_raw_edges.extend(parsed.edges.iter().cloned());
        }
        summary.symbols = all_symbols.len();

        ChunkStore::insert_batch(&mut tx, &all_chunks).await?;
        summary.chunks = all_chunks.len();

        let outcome = EdgeResolver::resolve(
            &mut tx,
            repo.id,
            branch_name,
            commit_sha,
            &all_raw_edges,
            &all_symbols,
        )
        .await?;
        EdgeStore::insert_batch(&mut tx, &outcome.edges).await?;
        summary.edges_resolved = outcome.resolved;
        summary.edges_discarded = outcome.discarded;

        // Embeddings obtained up front are persisted with the batch; the
        // rest go to the durable queue.
        let mut embedding_rows: Vec<Embedding> = Vec::new();
        let mut job_rows: Vec<EmbeddingJob> = Vec::new();
        for chunk in &all_chunks {
            match vectors.get(&chunk.id) {
                Some(vector) => embedding_rows.push(Embedding {
                    id: Uuid::new_v4(),
                    chunk_id: chunk.id,
                    repo_id: repo.id,
                    branch_name: branch_name.to_string(),
                    commit_sha: commit_sha.to_string(),
                    vector: vector.clone(),
                    model: self.provider.model().to_string(),
                    model_version: None,
                    generated_at: Utc::now(),
                }),
                None if self.provider.enabled() => job_rows.push(EmbeddingJob {
                    id: Uuid::new_v4(),
                    repo_id: repo.id,
                    branch_name: branch_name.to_string(),
                    commit_sha: commit_sha.to_string(),
                    target_kind: "code_chunk".to_string(),
                    target_id: chunk.id,
                    model: self.provider.model().to_string(),
                    dims: None,
                    status: JobStatus::Pending,
                    attempts: 0,
                    next_attempt_at: Utc::now(),
                    locked_by: None,
                    locked_at: None,
                    last_error: None,
                }),
                None => {}
            }
        }
        EmbeddingStore::upsert_batch(&mut tx, &embedding_rows).await?;
        JobStore::enqueue_batch(&mut tx, &job_rows).await?;
        summary.jobs_enqueued = job_rows.len();

        tx.commit().await?;
        Ok(summary)
    }

    /// Read blobs and parse them under the configured concurrency bound.
    /// Oversized and binary files are skipped; per-file parse failures are
    /// carried on the `ParsedFile`, never failing the batch.
    async fn read_and_parse(
        &self,
        repo: &Repository,
        branch_name: &str,
        commit_sha: &str,
        changes: Vec<FileChange>,
    ) -> Result<Vec<ParsedFile>> {
        let semaphore = Arc::new(Semaphore::new(self.config.indexing.file_read_concurrency));
        let mut tasks: JoinSet<Result<Option<ParsedFile>>> = JoinSet::new();

        for change in changes {
            let semaphore = Arc::clone(&semaphore);
            let registry = Arc::clone(&self.registry);
            let tracker = Arc::clone(&self.tracker);
            let repo = repo.clone();
            let branch_name = branch_name.to_string();
            let commit_sha = commit_sha.to_string();
            let max_file_bytes = self.config.indexing.max_file_bytes;

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| Error::Internal(format!("semaphore closed: {e}")))?;

                if let Some(size) = tracker.blob_size(&repo, &commit_sha, &change.path).await? {
                    if size > max_file_bytes {
                        tracing::debug!(file = %change.path, size, "skipping oversized file");
                        return Ok(None);
                    }
                }

                let Some(source) = tracker
                    .file_content(&repo, &commit_sha, &change.path)
                    .await?
                else {
                    return Ok(None);
                };

                let lang = language::detect(&change.path, Some(&source));
                if !language::should_index(lang) {
                    return Ok(None);
                }
                if !registry.supports(lang) {
                    return Ok(None);
                }

                let ctx = ParseContext {
                    repo_id: repo.id,
                    branch_name: &branch_name,
                    commit_sha: &commit_sha,
                };
                let parsed = registry.parse(&ctx, &change.path, lang, &source);
                if !parsed.success {
                    tracing::warn!(
                        file = %change.path,
                        error = parsed.error.as_deref().unwrap_or("unknown"),
                        "parse failed"
                    );
                }
                Ok(Some(parsed))
            });
        }

        let mut parsed_files = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| Error::Internal(format!("parse task panicked: {e}")))?;
            if let Some(parsed) = result? {
                parsed_files.push(parsed);
            }
        }
        Ok(parsed_files)
    }

    /// Request embeddings for every chunk up front, batched. Any failure
    /// degrades to the job queue.
    async fn embed_upfront(&self, chunks: &[CodeChunk]) -> HashMap<Uuid, Vec<f32>> {
        let mut vectors = HashMap::new();
        if !self.provider.enabled() || chunks.is_empty() {
            return vectors;
        }

        for batch in chunks.chunks(self.provider.batch_size().max(1)) {
            let inputs: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            match self.provider.embed(&inputs).await {
                Ok(embedded) if embedded.len() == batch.len() => {
                    for (chunk, vector) in batch.iter().zip(embedded) {
                        vectors.insert(chunk.id, vector);
                    }
                }
                Ok(_) => break,
                Err(e) => {
                    tracing::warn!("up-front embedding failed, deferring to job queue: {e}");
                    break;
                }
            }
        }
        vectors
    }
}

async fn insert_file_record(
    conn: &mut sqlx::PgConnection,
    repo: &Repository,
    branch_name: &str,
    commit_sha: &str,
    parsed: &ParsedFile,
) -> Result<()> {
    let record = FileRecord {
        id: Uuid::new_v4(),
        repo_id: repo.id,
        branch_name: branch_name.to_string(),
        file_path: parsed.file_path.clone(),
        commit_sha: commit_sha.to_string(),
        language: parsed.language,
        size_bytes: parsed.source_text.len() as i64,
        line_count: parsed.source_text.lines().count() as i32,
    };

    sqlx::query(
        r#"
        INSERT INTO files (id, repo_id, branch_name, file_path, commit_sha,
                           language, size_bytes, line_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (repo_id, branch_name, file_path) DO UPDATE SET
            commit_sha = EXCLUDED.commit_sha,
            language = EXCLUDED.language,
            size_bytes = EXCLUDED.size_bytes,
            line_count = EXCLUDED.line_count,
            indexed_at = now()
        "#,
    )
    .bind(record.id)
    .bind(record.repo_id)
    .bind(&record.branch_name)
    .bind(&record.file_path)
    .bind(&record.commit_sha)
    .bind(record.language.to_string())
    .bind(record.size_bytes)
    .bind(record.line_count)
    .execute(conn)
    .await?;

    Ok(())
}

/// The symbol's line range within the file source.
fn symbol_body(parsed: &ParsedFile, symbol: &Symbol) -> String {
    let lines: Vec<&str> = parsed.source_text.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = symbol.span.start_line.clamp(1, lines.len() as u32) as usize;
    let end = symbol.span.end_line.clamp(start as u32, lines.len() as u32) as usize;
    lines[start - 1..end].join("\n")
}

/// SimHash fingerprint per symbol, over the bag of name sub-tokens plus
/// identifiers extracted from the symbol body.
fn build_fingerprints(parsed: &ParsedFile) -> Vec<SymbolFingerprint> {
    parsed
        .symbols
        .iter()
        .map(|symbol| {
            let body = symbol_body(parsed, symbol);
            let mut bag = Tokenizer::tokens(&symbol.name);
            bag.extend(Tokenizer::extract_identifiers(&body));
            let fp = Fingerprint::of_tokens(&bag);

            SymbolFingerprint {
                symbol_id: symbol.id,
                repo_id: symbol.repo_id,
                branch_name: symbol.branch_name.clone(),
                language: symbol.language,
                kind: symbol.kind,
                fingerprint_kind: FINGERPRINT_KIND.to_string(),
                fingerprint: fp.value,
                bands: fp.bands,
            }
        })
        .collect()
}

/// One lexical search document per symbol.
fn build_search_docs(parsed: &ParsedFile) -> Vec<SymbolSearchDoc> {
    parsed
        .symbols
        .iter()
        .map(|symbol| {
            let body = symbol_body(parsed, symbol);
            let snippet: String = symbol
                .signature
                .clone()
                .unwrap_or_else(|| body.lines().next().unwrap_or("").trim().to_string());

            SymbolSearchDoc {
                symbol_id: symbol.id,
                repo_id: symbol.repo_id,
                branch_name: symbol.branch_name.clone(),
                commit_sha: symbol.commit_sha.clone(),
                file_path: symbol.file_path.clone(),
                kind: symbol.kind,
                language: symbol.language,
                name_tokens: Tokenizer::unique_tokens(&symbol.name).join(" "),
                qualified_tokens: symbol
                    .qualified_name
                    .as_deref()
                    .map(|qn| Tokenizer::unique_tokens(qn).join(" "))
                    .unwrap_or_default(),
                signature_tokens: symbol
                    .signature
                    .as_deref()
                    .map(|sig| Tokenizer::unique_tokens(sig).join(" "))
                    .unwrap_or_default(),
                documentation_tokens: symbol
                    .documentation
                    .as_deref()
                    .map(|doc| Tokenizer::unique_tokens(doc).join(" "))
                    .unwrap_or_default(),
                literal_tokens: Tokenizer::extract_identifiers(&body).join(" "),
                snippet,
            }
        })
        .collect()
}
