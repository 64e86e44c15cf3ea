use sqlx::postgres::PgPool;
use sqlx::PgConnection;
use uuid::Uuid;

use lode_core::{Language, RepoId, Span, Symbol, SymbolId, SymbolKind};

#[derive(sqlx::FromRow)]
struct SymbolRow {
    id: Uuid,
    repo_id: Uuid,
    branch_name: String,
    file_path: String,
    commit_sha: String,
    name: String,
    qualified_name: Option<String>,
    kind: String,
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

impl SymbolRow {
    fn into_symbol(self) -> Symbol {
        Symbol {
            id: self.id,
            repo_id: self.repo_id,
            branch_name: self.branch_name,
            file_path: self.file_path,
            commit_sha: self.commit_sha,
            name: self.name,
            qualified_name: self.qualified_name,
            kind: self.kind.parse::<SymbolKind>().unwrap_or_else(|e| {
                tracing::warn!("{e}, defaulting to Variable");
                SymbolKind::Variable
            }),
            language: self.language.parse::<Language>().unwrap_or_else(|e| {
                tracing::warn!("{e}, defaulting to Unknown");
                Language::Unknown
            }),
            span: Span {
                start_line: self.start_line as u32,
                start_col: self.start_col as u32,
                end_line: self.end_line as u32,
                end_col: self.end_col as u32,
            },
            signature: self.signature,
            documentation: self.documentation,
            modifiers: self.modifiers,
            parent_symbol_id: self.parent_symbol_id,
        }
    }
}

const SYMBOL_COLUMNS: &str = "id, repo_id, branch_name, file_path, commit_sha, name, \
     qualified_name, kind, language, start_line, start_col, end_line, end_col, \
     signature, documentation, modifiers, parent_symbol_id";

/// PostgreSQL-backed store for the symbol table.
#[derive(Clone)]
pub struct SymbolStore {
    pool: PgPool,
}

impl SymbolStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one batch of symbols inside the indexing transaction.
    ///
    /// Upserts on the `(repo, branch, file, name, span)` identity so
    /// re-indexing the same commit is idempotent.
    pub async fn insert_batch(
        conn: &mut PgConnection,
        symbols: &[Symbol],
    ) -> lode_core::Result<()> {
        for sym in symbols {
            sqlx::query(
                r#"
                INSERT INTO symbols (
                    id, repo_id, branch_name, file_path, commit_sha, name,
                    qualified_name, kind, language, start_line, start_col,
                    end_line, end_col, signature, documentation, modifiers,
                    parent_symbol_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                ON CONFLICT (repo_id, branch_name, file_path, name, start_line, end_line)
                DO UPDATE SET
                    commit_sha = EXCLUDED.commit_sha,
                    qualified_name = EXCLUDED.qualified_name,
                    kind = EXCLUDED.kind,
                    language = EXCLUDED.language,
                    start_col = EXCLUDED.start_col,
                    end_col = EXCLUDED.end_col,
                    signature = EXCLUDED.signature,
                    documentation = EXCLUDED.documentation,
                    modifiers = EXCLUDED.modifiers,
                    parent_symbol_id = EXCLUDED.parent_symbol_id,
                    indexed_at = now()
                "#,
            )
            .bind(sym.id)
            .bind(sym.repo_id)
            .bind(&sym.branch_name)
            .bind(&sym.file_path)
            .bind(&sym.commit_sha)
            .bind(&sym.name)
            .bind(&sym.qualified_name)
            .bind(sym.kind.to_string())
            .bind(sym.language.to_string())
            .bind(sym.span.start_line as i32)
            .bind(sym.span.start_col as i32)
            .bind(sym.span.end_line as i32)
            .bind(sym.span.end_col as i32)
            .bind(&sym.signature)
            .bind(&sym.documentation)
            .bind(&sym.modifiers)
            .bind(sym.parent_symbol_id)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Delete every symbol of a file. Fingerprints, search rows, chunks,
    /// and edges touching them go with them via cascades.
    pub async fn delete_by_file(
        conn: &mut PgConnection,
        repo_id: RepoId,
        branch_name: &str,
        file_path: &str,
    ) -> lode_core::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM symbols WHERE repo_id = $1 AND branch_name = $2 AND file_path = $3",
        )
        .bind(repo_id)
        .bind(branch_name)
        .bind(file_path)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn get_by_id(&self, id: SymbolId) -> lode_core::Result<Option<Symbol>> {
        let sql = format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE id = $1");
        let row = sqlx::query_as::<_, SymbolRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(SymbolRow::into_symbol))
    }

    /// Fetch multiple symbols in one query; missing ids are omitted.
    pub async fn get_by_ids(&self, ids: &[SymbolId]) -> lode_core::Result<Vec<Symbol>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, SymbolRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(SymbolRow::into_symbol).collect())
    }

    /// Name-based fuzzy lookup: exact matches first, then substring
    /// matches, case-insensitive throughout.
    pub async fn find_by_name(
        &self,
        repo_id: RepoId,
        branch_name: &str,
        name: &str,
        language: Option<Language>,
        limit: i64,
    ) -> lode_core::Result<Vec<Symbol>> {
        let pattern = format!("%{name}%");
        let sql = format!(
            r#"
            SELECT {SYMBOL_COLUMNS} FROM symbols
            WHERE repo_id = $1 AND branch_name = $2
              AND (name ILIKE $3 OR qualified_name ILIKE $3)
              AND ($4::text IS NULL OR language = $4)
            ORDER BY (LOWER(name) = LOWER($5)) DESC, length(name), name
            LIMIT $6
            "#
        );
        let rows = sqlx::query_as::<_, SymbolRow>(&sql)
            .bind(repo_id)
            .bind(branch_name)
            .bind(&pattern)
            .bind(language.map(|l| l.to_string()))
            .bind(name)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(SymbolRow::into_symbol).collect())
    }

    /// Resolve lowercased qualified names to symbol ids within one
    /// `(repo, branch)`, in a single indexed query.
    pub async fn lookup_qualified(
        conn: &mut PgConnection,
        repo_id: RepoId,
        branch_name: &str,
        lowered: &[String],
    ) -> lode_core::Result<Vec<(String, SymbolId)>> {
        if lowered.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(String, Uuid)> = sqlx::query_as(
            r#"
            SELECT LOWER(qualified_name), id FROM symbols
            WHERE repo_id = $1 AND branch_name = $2
              AND LOWER(qualified_name) = ANY($3)
            "#,
        )
        .bind(repo_id)
        .bind(branch_name)
        .bind(lowered)
        .fetch_all(conn)
        .await?;

        Ok(rows)
    }

    /// Pattern lookup for parameter-stripped names: each pattern is a
    /// lowercase qualified name without its parameter list, matched
    /// verbatim or with a re-opened parameter list.
    pub async fn lookup_stripped(
        conn: &mut PgConnection,
        repo_id: RepoId,
        branch_name: &str,
        patterns: &[String],
    ) -> lode_core::Result<Vec<(String, SymbolId)>> {
        if patterns.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(String, Uuid)> = sqlx::query_as(
            r#"
            SELECT LOWER(qualified_name), id FROM symbols
            WHERE repo_id = $1 AND branch_name = $2
              AND (LOWER(qualified_name) = ANY($3) OR LOWER(qualified_name) LIKE ANY($4))
            "#,
        )
        .bind(repo_id)
        .bind(branch_name)
        .bind(patterns)
        .bind(
            patterns
                .iter()
                .map(|p| format!("{}(%", like_escape(p)))
                .collect::<Vec<_>>(),
        )
        .fetch_all(conn)
        .await?;

        Ok(rows)
    }

    /// Children of a parent symbol with a given short name,
    /// case-insensitive. Used by the resolver's local-scope fallback.
    pub async fn children_named(
        conn: &mut PgConnection,
        parent_symbol_id: SymbolId,
        short_name: &str,
    ) -> lode_core::Result<Vec<SymbolId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM symbols WHERE parent_symbol_id = $1 AND LOWER(name) = LOWER($2)",
        )
        .bind(parent_symbol_id)
        .bind(short_name)
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

/// Escape `%`, `_`, and `\` for use inside a LIKE pattern.
fn like_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::like_escape;

    #[test]
    fn like_escape_guards_wildcards() {
        assert_eq!(like_escape("ns.c.m"), "ns.c.m");
        assert_eq!(like_escape("a_b%c"), r"a\_b\%c");
    }
}
