use sqlx::postgres::PgPool;
use sqlx::PgConnection;
use uuid::Uuid;

use lode_core::{Language, SymbolFingerprint, SymbolId, SymbolKind};

#[derive(sqlx::FromRow)]
struct FingerprintRow {
    symbol_id: Uuid,
    repo_id: Uuid,
    branch_name: String,
    language: String,
    kind: String,
    fingerprint_kind: String,
    fingerprint: i64,
    band0: i32,
    band1: i32,
    band2: i32,
    band3: i32,
}

impl FingerprintRow {
    fn into_fingerprint(self) -> SymbolFingerprint {
        SymbolFingerprint {
            symbol_id: self.symbol_id,
            repo_id: self.repo_id,
            branch_name: self.branch_name,
            language: self.language.parse::<Language>().unwrap_or_else(|e| {
                tracing::warn!("{e}, defaulting to Unknown");
                Language::Unknown
            }),
            kind: self.kind.parse::<SymbolKind>().unwrap_or_else(|e| {
                tracing::warn!("{e}, defaulting to Function");
                SymbolKind::Function
            }),
            fingerprint_kind: self.fingerprint_kind,
            fingerprint: self.fingerprint as u64,
            bands: [
                self.band0 as u16,
                self.band1 as u16,
                self.band2 as u16,
                self.band3 as u16,
            ],
        }
    }
}

/// PostgreSQL-backed store for SimHash fingerprints and their band-bucket
/// candidate index.
#[derive(Clone)]
pub struct FingerprintStore {
    pool: PgPool,
}

impl FingerprintStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one batch of fingerprints inside the indexing transaction.
    /// The 64-bit value is stored two's-complement in a BIGINT.
    pub async fn insert_batch(
        conn: &mut PgConnection,
        fingerprints: &[SymbolFingerprint],
    ) -> lode_core::Result<()> {
        for fp in fingerprints {
            sqlx::query(
                r#"
                INSERT INTO symbol_fingerprints (
                    symbol_id, repo_id, branch_name, language, kind,
                    fingerprint_kind, fingerprint, band0, band1, band2, band3
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (symbol_id) DO UPDATE SET
                    fingerprint_kind = EXCLUDED.fingerprint_kind,
                    fingerprint = EXCLUDED.fingerprint,
                    band0 = EXCLUDED.band0,
                    band1 = EXCLUDED.band1,
                    band2 = EXCLUDED.band2,
                    band3 = EXCLUDED.band3
                "#,
            )
            .bind(fp.symbol_id)
            .bind(fp.repo_id)
            .bind(&fp.branch_name)
            .bind(fp.language.to_string())
            .bind(fp.kind.to_string())
            .bind(&fp.fingerprint_kind)
            .bind(fp.fingerprint as i64)
            .bind(i32::from(fp.bands[0]))
            .bind(i32::from(fp.bands[1]))
            .bind(i32::from(fp.bands[2]))
            .bind(i32::from(fp.bands[3]))
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn get(&self, symbol_id: SymbolId) -> lode_core::Result<Option<SymbolFingerprint>> {
        let row = sqlx::query_as::<_, FingerprintRow>(
            "SELECT symbol_id, repo_id, branch_name, language, kind, fingerprint_kind, \
                    fingerprint, band0, band1, band2, band3 \
             FROM symbol_fingerprints WHERE symbol_id = $1",
        )
        .bind(symbol_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FingerprintRow::into_fingerprint))
    }

    /// Candidate generation for similarity search: symbols in the same
    /// `(repo, branch, language, kind, fingerprint_kind)` scope agreeing
    /// with the seed on at least one band position, seed excluded, hard
    /// capped.
    pub async fn candidates(
        &self,
        seed: &SymbolFingerprint,
        cap: i64,
    ) -> lode_core::Result<Vec<(SymbolId, u64)>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT symbol_id, fingerprint
            FROM symbol_fingerprints
            WHERE repo_id = $1 AND branch_name = $2
              AND language = $3 AND kind = $4 AND fingerprint_kind = $5
              AND symbol_id <> $6
              AND (band0 = $7 OR band1 = $8 OR band2 = $9 OR band3 = $10)
            LIMIT $11
            "#,
        )
        .bind(seed.repo_id)
        .bind(&seed.branch_name)
        .bind(seed.language.to_string())
        .bind(seed.kind.to_string())
        .bind(&seed.fingerprint_kind)
        .bind(seed.symbol_id)
        .bind(i32::from(seed.bands[0]))
        .bind(i32::from(seed.bands[1]))
        .bind(i32::from(seed.bands[2]))
        .bind(i32::from(seed.bands[3]))
        .bind(cap)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id, fp)| (id, fp as u64)).collect())
    }
}
