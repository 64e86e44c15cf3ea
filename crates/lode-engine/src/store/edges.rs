use sqlx::postgres::PgPool;
use sqlx::PgConnection;
use uuid::Uuid;

use lode_core::{Edge, EdgeKind, Symbol, SymbolId};

/// One edge endpoint as seen from a symbol: the relation kind plus the
/// symbol at the other end.
#[derive(Debug, Clone)]
pub struct EdgeNeighbor {
    pub kind: EdgeKind,
    pub symbol: Symbol,
}

/// PostgreSQL-backed store for the symbol relation graph.
#[derive(Clone)]
pub struct EdgeStore {
    pool: PgPool,
}

impl EdgeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert resolved edges inside the indexing transaction. Idempotent
    /// on `(source, target, kind)`.
    pub async fn insert_batch(conn: &mut PgConnection, edges: &[Edge]) -> lode_core::Result<()> {
        for edge in edges {
            sqlx::query(
                r#"
                INSERT INTO edges (id, repo_id, branch_name, commit_sha,
                                   source_symbol_id, target_symbol_id, kind)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (source_symbol_id, target_symbol_id, kind) DO NOTHING
                "#,
            )
            .bind(edge.id)
            .bind(edge.repo_id)
            .bind(&edge.branch_name)
            .bind(&edge.commit_sha)
            .bind(edge.source_symbol_id)
            .bind(edge.target_symbol_id)
            .bind(edge.kind.to_string())
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Outgoing relations of a symbol, bounded.
    pub async fn outgoing(
        &self,
        symbol_id: SymbolId,
        limit: i64,
    ) -> lode_core::Result<Vec<EdgeNeighbor>> {
        self.neighbors(symbol_id, "source_symbol_id", "target_symbol_id", limit)
            .await
    }

    /// Incoming relations of a symbol (who calls/extends/uses it), bounded.
    pub async fn incoming(
        &self,
        symbol_id: SymbolId,
        limit: i64,
    ) -> lode_core::Result<Vec<EdgeNeighbor>> {
        self.neighbors(symbol_id, "target_symbol_id", "source_symbol_id", limit)
            .await
    }

    async fn neighbors(
        &self,
        symbol_id: SymbolId,
        match_col: &str,
        other_col: &str,
        limit: i64,
    ) -> lode_core::Result<Vec<EdgeNeighbor>> {
        let sql = format!(
            r#"
            SELECT e.kind, s.id, s.repo_id, s.branch_name, s.file_path, s.commit_sha,
                   s.name, s.qualified_name, s.kind AS symbol_kind, s.language,
                   s.start_line, s.start_col, s.end_line, s.end_col,
                   s.signature, s.documentation, s.modifiers, s.parent_symbol_id
            FROM edges e
            JOIN symbols s ON s.id = e.{other_col}
            WHERE e.{match_col} = $1
            ORDER BY e.kind, s.name
            LIMIT $2
            "#
        );

        let rows: Vec<NeighborRow> = sqlx::query_as(&sql)
            .bind(symbol_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(NeighborRow::into_neighbor).collect())
    }

    /// In/out degree of a symbol, for graph re-ranking.
    pub async fn degree(&self, symbol_id: SymbolId) -> lode_core::Result<(i64, i64)> {
        let row: (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM edges WHERE source_symbol_id = $1),
                (SELECT COUNT(*) FROM edges WHERE target_symbol_id = $1)
            "#,
        )
        .bind(symbol_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Number of persisted edges for a `(repo, branch)` scope.
    pub async fn count(
        &self,
        repo_id: lode_core::RepoId,
        branch_name: &str,
    ) -> lode_core::Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM edges WHERE repo_id = $1 AND branch_name = $2",
        )
        .bind(repo_id)
        .bind(branch_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct NeighborRow {
    kind: String,
    id: Uuid,
    repo_id: Uuid,
    branch_name: String,
    file_path: String,
    commit_sha: String,
    name: String,
    qualified_name: Option<String>,
    symbol_kind: String,
    language: String,
    start_line: i32,
    start_col: i32,
    end_line: i32,
    end_col: i32,
    signature: Option<String>,
    documentation: Option<String>,
    modifiers: Vec<String>,
    parent_symbol_id: Option<Uuid>,
}

impl NeighborRow {
    fn into_neighbor(self) -> EdgeNeighbor {
        EdgeNeighbor {
            kind: self.kind.parse::<EdgeKind>().unwrap_or_else(|e| {
                tracing::warn!("{e}, defaulting to Calls");
                EdgeKind::Calls
            }),
            symbol: Symbol {
                id: self.id,
                repo_id: self.repo_id,
                branch_name: self.branch_name,
                file_path: self.file_path,
                commit_sha: self.commit_sha,
                name: self.name,
                qualified_name: self.qualified_name,
                kind: self.symbol_kind.parse().unwrap_or_else(|e| {
                    tracing::warn!("{e}, defaulting to Variable");
                    lode_core::SymbolKind::Variable
                }),
                language: self.language.parse().unwrap_or_else(|e| {
                    tracing::warn!("{e}, defaulting to Unknown");
                    lode_core::Language::Unknown
                }),
                span: lode_core::Span {
                    start_line: self.start_line as u32,
                    start_col: self.start_col as u32,
                    end_line: self.end_line as u32,
                    end_col: self.end_col as u32,
                },
                signature: self.signature,
                documentation: self.documentation,
                modifiers: self.modifiers,
                parent_symbol_id: self.parent_symbol_id,
            },
        }
    }
}
