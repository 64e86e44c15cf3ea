use sqlx::postgres::PgPool;
use sqlx::PgConnection;
use uuid::Uuid;

use lode_core::{ChunkId, CodeChunk, Language, RepoId, SymbolKind};

use super::vector_literal;

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: Uuid,
    repo_id: Uuid,
    branch_name: String,
    file_path: String,
    symbol_id: Option<Uuid>,
    symbol_name: String,
    symbol_kind: String,
    language: String,
    content: String,
    chunk_start_line: i32,
    chunk_end_line: i32,
    symbol_start_line: i32,
    symbol_end_line: i32,
    token_count: i32,
    parent_symbol_name: Option<String>,
    signature: Option<String>,
    documentation: Option<String>,
}

impl ChunkRow {
    fn into_chunk(self) -> CodeChunk {
        CodeChunk {
            id: self.id,
            repo_id: self.repo_id,
            branch_name: self.branch_name,
            file_path: self.file_path,
            symbol_id: self.symbol_id,
            symbol_name: self.symbol_name,
            symbol_kind: self.symbol_kind.parse::<SymbolKind>().unwrap_or_else(|e| {
                tracing::warn!("{e}, defaulting to Function");
                SymbolKind::Function
            }),
            language: self.language.parse::<Language>().unwrap_or_else(|e| {
                tracing::warn!("{e}, defaulting to Unknown");
                Language::Unknown
            }),
            content: self.content,
            chunk_start_line: self.chunk_start_line as u32,
            chunk_end_line: self.chunk_end_line as u32,
            symbol_start_line: self.symbol_start_line as u32,
            symbol_end_line: self.symbol_end_line as u32,
            token_count: self.token_count,
            parent_symbol_name: self.parent_symbol_name,
            signature: self.signature,
            documentation: self.documentation,
        }
    }
}

const CHUNK_COLUMNS: &str = "id, repo_id, branch_name, file_path, symbol_id, symbol_name, \
     symbol_kind, language, content, chunk_start_line, chunk_end_line, \
     symbol_start_line, symbol_end_line, token_count, parent_symbol_name, \
     signature, documentation";

/// One hit from the hybrid chunk search.
#[derive(Debug, Clone)]
pub struct HybridHit {
    pub chunk_id: ChunkId,
    pub score: f64,
    pub bm25_score: f64,
    pub vector_score: f64,
}

/// PostgreSQL-backed store for code chunks, including the hybrid
/// lexical/vector search the query orchestrator consumes.
#[derive(Clone)]
pub struct ChunkStore {
    pool: PgPool,
}

impl ChunkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one batch of chunks inside the indexing transaction.
    pub async fn insert_batch(
        conn: &mut PgConnection,
        chunks: &[CodeChunk],
    ) -> lode_core::Result<()> {
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO code_chunks (
                    id, repo_id, branch_name, file_path, symbol_id, symbol_name,
                    symbol_kind, language, content, chunk_start_line, chunk_end_line,
                    symbol_start_line, symbol_end_line, token_count,
                    parent_symbol_name, signature, documentation
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                ON CONFLICT (repo_id, branch_name, file_path, chunk_start_line, chunk_end_line)
                DO UPDATE SET
                    symbol_id = EXCLUDED.symbol_id,
                    symbol_name = EXCLUDED.symbol_name,
                    symbol_kind = EXCLUDED.symbol_kind,
                    language = EXCLUDED.language,
                    content = EXCLUDED.content,
                    symbol_start_line = EXCLUDED.symbol_start_line,
                    symbol_end_line = EXCLUDED.symbol_end_line,
                    token_count = EXCLUDED.token_count,
                    parent_symbol_name = EXCLUDED.parent_symbol_name,
                    signature = EXCLUDED.signature,
                    documentation = EXCLUDED.documentation
                "#,
            )
            .bind(chunk.id)
            .bind(chunk.repo_id)
            .bind(&chunk.branch_name)
            .bind(&chunk.file_path)
            .bind(chunk.symbol_id)
            .bind(&chunk.symbol_name)
            .bind(chunk.symbol_kind.to_string())
            .bind(chunk.language.to_string())
            .bind(&chunk.content)
            .bind(chunk.chunk_start_line as i32)
            .bind(chunk.chunk_end_line as i32)
            .bind(chunk.symbol_start_line as i32)
            .bind(chunk.symbol_end_line as i32)
            .bind(chunk.token_count)
            .bind(&chunk.parent_symbol_name)
            .bind(&chunk.signature)
            .bind(&chunk.documentation)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn delete_by_file(
        conn: &mut PgConnection,
        repo_id: RepoId,
        branch_name: &str,
        file_path: &str,
    ) -> lode_core::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM code_chunks WHERE repo_id = $1 AND branch_name = $2 AND file_path = $3",
        )
        .bind(repo_id)
        .bind(branch_name)
        .bind(file_path)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn get_by_id(&self, id: ChunkId) -> lode_core::Result<Option<CodeChunk>> {
        let sql = format!("SELECT {CHUNK_COLUMNS} FROM code_chunks WHERE id = $1");
        let row = sqlx::query_as::<_, ChunkRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(ChunkRow::into_chunk))
    }

    pub async fn get_by_ids(&self, ids: &[ChunkId]) -> lode_core::Result<Vec<CodeChunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {CHUNK_COLUMNS} FROM code_chunks WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, ChunkRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(ChunkRow::into_chunk).collect())
    }

    /// Hybrid search over chunks: a BM25-style lexical score from the
    /// stored tsvector fused with a cosine vector score when a query
    /// embedding is supplied. Scores are combined client-side and the
    /// fused list is truncated to `limit`.
    pub async fn hybrid_search(
        &self,
        repo_id: RepoId,
        branch_name: &str,
        text: &str,
        query_vector: Option<&[f32]>,
        bm25_weight: f64,
        vector_weight: f64,
        limit: i64,
    ) -> lode_core::Result<Vec<HybridHit>> {
        let rows: Vec<(Uuid, f64, f64)> = match query_vector {
            Some(vector) => {
                sqlx::query_as(
                    r#"
                    WITH lex AS (
                        SELECT id, ts_rank_cd(content_tsv, plainto_tsquery('simple', $3))::float8 AS bm25
                        FROM code_chunks
                        WHERE repo_id = $1 AND branch_name = $2
                          AND content_tsv @@ plainto_tsquery('simple', $3)
                        ORDER BY bm25 DESC
                        LIMIT $5
                    ),
                    vec AS (
                        SELECT c.id, (1 - (e.vector <=> $4::vector))::float8 AS vscore
                        FROM embeddings e
                        JOIN code_chunks c ON c.id = e.chunk_id
                        WHERE c.repo_id = $1 AND c.branch_name = $2
                        ORDER BY e.vector <=> $4::vector
                        LIMIT $5
                    )
                    SELECT COALESCE(l.id, v.id) AS chunk_id,
                           COALESCE(l.bm25, 0) AS bm25,
                           COALESCE(v.vscore, 0) AS vscore
                    FROM lex l
                    FULL OUTER JOIN vec v ON l.id = v.id
                    "#,
                )
                .bind(repo_id)
                .bind(branch_name)
                .bind(text)
                .bind(vector_literal(vector))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id AS chunk_id,
                           ts_rank_cd(content_tsv, plainto_tsquery('simple', $3))::float8 AS bm25,
                           0::float8 AS vscore
                    FROM code_chunks
                    WHERE repo_id = $1 AND branch_name = $2
                      AND content_tsv @@ plainto_tsquery('simple', $3)
                    ORDER BY bm25 DESC
                    LIMIT $4
                    "#,
                )
                .bind(repo_id)
                .bind(branch_name)
                .bind(text)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut hits: Vec<HybridHit> = rows
            .into_iter()
            .map(|(chunk_id, bm25, vscore)| HybridHit {
                chunk_id,
                score: bm25_weight * bm25.min(1.0) + vector_weight * vscore,
                bm25_score: bm25,
                vector_score: vscore,
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit as usize);
        Ok(hits)
    }
}
