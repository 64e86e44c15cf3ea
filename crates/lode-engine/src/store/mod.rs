//! PostgreSQL-backed persistence.
//!
//! Each entity family gets its own store over a shared pool; batch writes
//! that must be atomic run as associated functions over a live
//! `PgConnection` so the indexing orchestrator can hold them all inside one
//! transaction.

pub mod chunks;
pub mod edges;
pub mod embeddings;
pub mod fingerprints;
pub mod jobs;
pub mod repos;
pub mod search;
pub mod symbols;

pub use chunks::{ChunkStore, HybridHit};
pub use edges::{EdgeNeighbor, EdgeStore};
pub use embeddings::EmbeddingStore;
pub use fingerprints::FingerprintStore;
pub use jobs::JobStore;
pub use repos::RepoStore;
pub use search::{SearchHit, SearchStore};
pub use symbols::SymbolStore;

use sqlx::postgres::PgPool;

/// Aggregate handle over all entity stores.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    pub repos: RepoStore,
    pub symbols: SymbolStore,
    pub chunks: ChunkStore,
    pub edges: EdgeStore,
    pub fingerprints: FingerprintStore,
    pub embeddings: EmbeddingStore,
    pub search: SearchStore,
    pub jobs: JobStore,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repos: RepoStore::new(pool.clone()),
            symbols: SymbolStore::new(pool.clone()),
            chunks: ChunkStore::new(pool.clone()),
            edges: EdgeStore::new(pool.clone()),
            fingerprints: FingerprintStore::new(pool.clone()),
            embeddings: EmbeddingStore::new(pool.clone()),
            search: SearchStore::new(pool.clone()),
            jobs: JobStore::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a transaction for one indexing batch.
    pub async fn begin(&self) -> lode_core::Result<sqlx::Transaction<'static, sqlx::Postgres>> {
        Ok(self.pool.begin().await?)
    }
}

/// Render a vector in pgvector's literal form (`[a,b,c]`) for a
/// `$n::vector` bind.
pub(crate) fn vector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, v) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{v}"));
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::vector_literal;

    #[test]
    fn vector_literal_formats_pgvector_input() {
        assert_eq!(vector_literal(&[1.0, -0.5, 0.25]), "[1,-0.5,0.25]");
        assert_eq!(vector_literal(&[]), "[]");
    }
}
