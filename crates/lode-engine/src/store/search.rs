use sqlx::postgres::PgPool;
use sqlx::PgConnection;
use uuid::Uuid;

use lode_core::{Language, RepoId, SymbolId, SymbolSearchDoc};

/// One lexical symbol search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub symbol_id: SymbolId,
    pub rank: f64,
    pub snippet: String,
}

/// PostgreSQL full-text search over symbol documents. Ranking uses
/// `ts_rank_cd` over the weighted stored tsvector.
#[derive(Clone)]
pub struct SearchStore {
    pool: PgPool,
}

impl SearchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one batch of search documents inside the indexing
    /// transaction.
    pub async fn insert_batch(
        conn: &mut PgConnection,
        docs: &[SymbolSearchDoc],
    ) -> lode_core::Result<()> {
        for doc in docs {
            sqlx::query(
                r#"
                INSERT INTO symbol_search (
                    symbol_id, repo_id, branch_name, commit_sha, file_path,
                    kind, language, name_tokens, qualified_tokens,
                    signature_tokens, documentation_tokens, literal_tokens, snippet
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (symbol_id) DO UPDATE SET
                    commit_sha = EXCLUDED.commit_sha,
                    name_tokens = EXCLUDED.name_tokens,
                    qualified_tokens = EXCLUDED.qualified_tokens,
                    signature_tokens = EXCLUDED.signature_tokens,
                    documentation_tokens = EXCLUDED.documentation_tokens,
                    literal_tokens = EXCLUDED.literal_tokens,
                    snippet = EXCLUDED.snippet
                "#,
            )
            .bind(doc.symbol_id)
            .bind(doc.repo_id)
            .bind(&doc.branch_name)
            .bind(&doc.commit_sha)
            .bind(&doc.file_path)
            .bind(doc.kind.to_string())
            .bind(doc.language.to_string())
            .bind(&doc.name_tokens)
            .bind(&doc.qualified_tokens)
            .bind(&doc.signature_tokens)
            .bind(&doc.documentation_tokens)
            .bind(&doc.literal_tokens)
            .bind(&doc.snippet)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Ranked full-text search within one `(repo, branch)`.
    pub async fn full_text(
        &self,
        repo_id: RepoId,
        branch_name: &str,
        query: &str,
        language: Option<Language>,
        limit: i64,
    ) -> lode_core::Result<Vec<SearchHit>> {
        let rows: Vec<(Uuid, f64, String)> = sqlx::query_as(
            r#"
            SELECT symbol_id,
                   ts_rank_cd(search_vector, plainto_tsquery('simple', $3))::float8 AS rank,
                   snippet
            FROM symbol_search
            WHERE repo_id = $1 AND branch_name = $2
              AND search_vector @@ plainto_tsquery('simple', $3)
              AND ($4::text IS NULL OR language = $4)
            ORDER BY rank DESC
            LIMIT $5
            "#,
        )
        .bind(repo_id)
        .bind(branch_name)
        .bind(query)
        .bind(language.map(|l| l.to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(symbol_id, rank, snippet)| SearchHit {
                symbol_id,
                rank,
                snippet,
            })
            .collect())
    }

    /// Stored snippets for a set of symbols.
    pub async fn snippets(
        &self,
        ids: &[SymbolId],
    ) -> lode_core::Result<std::collections::HashMap<SymbolId, String>> {
        if ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT symbol_id, snippet FROM symbol_search WHERE symbol_id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }
}
