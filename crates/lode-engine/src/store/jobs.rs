use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::PgConnection;
use uuid::Uuid;

use lode_core::{EmbeddingJob, JobId, JobStatus};

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    repo_id: Uuid,
    branch_name: String,
    commit_sha: String,
    target_kind: String,
    target_id: Uuid,
    model: String,
    dims: Option<i32>,
    status: String,
    attempts: i32,
    next_attempt_at: DateTime<Utc>,
    locked_by: Option<String>,
    locked_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl JobRow {
    fn into_job(self) -> EmbeddingJob {
        EmbeddingJob {
            id: self.id,
            repo_id: self.repo_id,
            branch_name: self.branch_name,
            commit_sha: self.commit_sha,
            target_kind: self.target_kind,
            target_id: self.target_id,
            model: self.model,
            dims: self.dims,
            status: self.status.parse::<JobStatus>().unwrap_or_else(|e| {
                tracing::warn!("{e}, defaulting to Pending");
                JobStatus::Pending
            }),
            attempts: self.attempts,
            next_attempt_at: self.next_attempt_at,
            locked_by: self.locked_by,
            locked_at: self.locked_at,
            last_error: self.last_error,
        }
    }
}

const JOB_COLUMNS: &str = "id, repo_id, branch_name, commit_sha, target_kind, target_id, \
     model, dims, status, attempts, next_attempt_at, locked_by, locked_at, last_error";

/// Durable embedding work queue.
///
/// The claim step is single-writer-safe: candidate rows are selected
/// `FOR UPDATE SKIP LOCKED` so concurrent workers never hand out the same
/// job twice, and a lease (`locked_at` + stale cutoff) bounds the damage
/// of a crashed worker.
#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue jobs inside the indexing transaction. A job already present
    /// for the same `(target_kind, target_id, model)` is left untouched,
    /// so re-enqueueing a completed job is a no-op.
    pub async fn enqueue_batch(
        conn: &mut PgConnection,
        jobs: &[EmbeddingJob],
    ) -> lode_core::Result<()> {
        for job in jobs {
            sqlx::query(
                r#"
                INSERT INTO embedding_jobs (id, repo_id, branch_name, commit_sha,
                                            target_kind, target_id, model, dims, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
                ON CONFLICT (target_kind, target_id, model) DO NOTHING
                "#,
            )
            .bind(job.id)
            .bind(job.repo_id)
            .bind(&job.branch_name)
            .bind(&job.commit_sha)
            .bind(&job.target_kind)
            .bind(job.target_id)
            .bind(&job.model)
            .bind(job.dims)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Reset `InProgress` rows whose lease expired before `cutoff` back to
    /// `Pending`. Monotonic: re-running with the same cutoff is a no-op.
    pub async fn requeue_stale(&self, cutoff: DateTime<Utc>) -> lode_core::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE embedding_jobs
            SET status = 'pending', locked_by = NULL, locked_at = NULL, updated_at = now()
            WHERE status = 'in_progress' AND locked_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Atomically claim up to `batch_size` due pending jobs for
    /// `worker_id`. Claiming counts as an attempt.
    pub async fn claim(
        &self,
        worker_id: &str,
        batch_size: i64,
    ) -> lode_core::Result<Vec<EmbeddingJob>> {
        let sql = format!(
            r#"
            UPDATE embedding_jobs
            SET status = 'in_progress',
                locked_by = $1,
                locked_at = now(),
                attempts = attempts + 1,
                updated_at = now()
            WHERE id IN (
                SELECT id FROM embedding_jobs
                WHERE status = 'pending' AND next_attempt_at <= now()
                ORDER BY id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(worker_id)
            .bind(batch_size)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    /// Mark a job done. `dims` records the produced vector length;
    /// `note` carries a terminal diagnostic (e.g. `chunk_missing`).
    pub async fn complete(
        &self,
        id: JobId,
        dims: Option<i32>,
        note: Option<&str>,
    ) -> lode_core::Result<()> {
        sqlx::query(
            r#"
            UPDATE embedding_jobs
            SET status = 'completed', dims = COALESCE($2, dims), last_error = $3,
                locked_by = NULL, locked_at = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(dims)
        .bind(note)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Park a job permanently with a machine-readable error code.
    pub async fn block(&self, id: JobId, code: &str) -> lode_core::Result<()> {
        sqlx::query(
            r#"
            UPDATE embedding_jobs
            SET status = 'blocked', last_error = $2,
                locked_by = NULL, locked_at = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Return a job to the queue for a later attempt.
    pub async fn retry_at(
        &self,
        id: JobId,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> lode_core::Result<()> {
        sqlx::query(
            r#"
            UPDATE embedding_jobs
            SET status = 'pending', next_attempt_at = $2, last_error = $3,
                locked_by = NULL, locked_at = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next_attempt_at)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: JobId) -> lode_core::Result<Option<EmbeddingJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM embedding_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(JobRow::into_job))
    }
}
