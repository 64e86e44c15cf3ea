use sqlx::postgres::PgPool;
use sqlx::PgConnection;

use lode_core::Embedding;

use super::vector_literal;

/// PostgreSQL-backed store for chunk embeddings (pgvector column).
#[derive(Clone)]
pub struct EmbeddingStore {
    pool: PgPool,
}

impl EmbeddingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert embeddings inside a live connection/transaction. One chunk
    /// owns at most one embedding: replacing upserts on `chunk_id`.
    pub async fn upsert_batch(
        conn: &mut PgConnection,
        embeddings: &[Embedding],
    ) -> lode_core::Result<()> {
        for emb in embeddings {
            sqlx::query(
                r#"
                INSERT INTO embeddings (id, chunk_id, repo_id, branch_name, commit_sha,
                                        vector, model, model_version)
                VALUES ($1, $2, $3, $4, $5, $6::vector, $7, $8)
                ON CONFLICT (chunk_id) DO UPDATE SET
                    vector = EXCLUDED.vector,
                    model = EXCLUDED.model,
                    model_version = EXCLUDED.model_version,
                    commit_sha = EXCLUDED.commit_sha,
                    generated_at = now()
                "#,
            )
            .bind(emb.id)
            .bind(emb.chunk_id)
            .bind(emb.repo_id)
            .bind(&emb.branch_name)
            .bind(&emb.commit_sha)
            .bind(vector_literal(&emb.vector))
            .bind(&emb.model)
            .bind(&emb.model_version)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Pool-backed batch upsert for the embedding worker, which runs
    /// outside any indexing transaction.
    pub async fn upsert_batch_pooled(&self, embeddings: &[Embedding]) -> lode_core::Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_batch(&mut tx, embeddings).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn count_for_chunk(&self, chunk_id: lode_core::ChunkId) -> lode_core::Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM embeddings WHERE chunk_id = $1")
                .bind(chunk_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}
