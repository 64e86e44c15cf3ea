use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::PgConnection;
use uuid::Uuid;

use lode_core::{Branch, Commit, IndexState, RepoId, Repository};

#[derive(sqlx::FromRow)]
struct RepositoryRow {
    id: Uuid,
    name: String,
    remote_url: String,
    default_branch: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RepositoryRow {
    fn into_repository(self) -> Repository {
        Repository {
            id: self.id,
            name: self.name,
            remote_url: self.remote_url,
            default_branch: self.default_branch,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BranchRow {
    id: Uuid,
    repo_id: Uuid,
    name: String,
    head_commit_sha: String,
    indexed_commit_sha: Option<String>,
    index_state: String,
    last_indexed_at: Option<DateTime<Utc>>,
    last_accessed_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BranchRow {
    fn into_branch(self) -> Branch {
        Branch {
            id: self.id,
            repo_id: self.repo_id,
            name: self.name,
            head_commit_sha: self.head_commit_sha,
            indexed_commit_sha: self.indexed_commit_sha,
            index_state: self.index_state.parse::<IndexState>().unwrap_or_else(|e| {
                tracing::warn!("{e}, defaulting to Pending");
                IndexState::Pending
            }),
            last_indexed_at: self.last_indexed_at,
            last_accessed_at: self.last_accessed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const BRANCH_COLUMNS: &str = "id, repo_id, name, head_commit_sha, indexed_commit_sha, \
     index_state, last_indexed_at, last_accessed_at, created_at, updated_at";

/// Store for repository, branch, and commit rows.
#[derive(Clone)]
pub struct RepoStore {
    pool: PgPool,
}

impl RepoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the repository on first sight; update the remote URL on
    /// repeat sightings. Repositories are never deleted implicitly.
    pub async fn ensure_repository(
        &self,
        name: &str,
        remote_url: &str,
        default_branch: &str,
    ) -> lode_core::Result<Repository> {
        let row = sqlx::query_as::<_, RepositoryRow>(
            r#"
            INSERT INTO repositories (id, name, remote_url, default_branch)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE SET
                remote_url = EXCLUDED.remote_url,
                updated_at = now()
            RETURNING id, name, remote_url, default_branch, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(remote_url)
        .bind(default_branch)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_repository())
    }

    pub async fn get_by_name(&self, name: &str) -> lode_core::Result<Option<Repository>> {
        let row = sqlx::query_as::<_, RepositoryRow>(
            "SELECT id, name, remote_url, default_branch, created_at, updated_at \
             FROM repositories WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RepositoryRow::into_repository))
    }

    /// Record the observed HEAD for a branch.
    ///
    /// New branches start `Pending`; a HEAD change on a known branch flips
    /// its state to `Stale`. `last_accessed_at` is refreshed either way.
    pub async fn upsert_branch(
        &self,
        repo_id: RepoId,
        name: &str,
        head_commit_sha: &str,
    ) -> lode_core::Result<Branch> {
        let sql = format!(
            r#"
            INSERT INTO branches (id, repo_id, name, head_commit_sha, index_state)
            VALUES ($1, $2, $3, $4, 'pending')
            ON CONFLICT (repo_id, name) DO UPDATE SET
                index_state = CASE
                    WHEN branches.head_commit_sha IS DISTINCT FROM EXCLUDED.head_commit_sha
                        THEN 'stale'
                    ELSE branches.index_state
                END,
                head_commit_sha = EXCLUDED.head_commit_sha,
                last_accessed_at = now(),
                updated_at = now()
            RETURNING {BRANCH_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, BranchRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(repo_id)
            .bind(name)
            .bind(head_commit_sha)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into_branch())
    }

    pub async fn branch(&self, repo_id: RepoId, name: &str) -> lode_core::Result<Option<Branch>> {
        let sql =
            format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE repo_id = $1 AND name = $2");
        let row = sqlx::query_as::<_, BranchRow>(&sql)
            .bind(repo_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(BranchRow::into_branch))
    }

    pub async fn set_index_state(
        &self,
        repo_id: RepoId,
        name: &str,
        state: IndexState,
    ) -> lode_core::Result<()> {
        sqlx::query(
            "UPDATE branches SET index_state = $3, updated_at = now() \
             WHERE repo_id = $1 AND name = $2",
        )
        .bind(repo_id)
        .bind(name)
        .bind(state.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a successful index of `sha`. Idempotent for the same
    /// `(repo, branch, sha)`.
    pub async fn mark_indexed(
        &self,
        repo_id: RepoId,
        name: &str,
        sha: &str,
    ) -> lode_core::Result<()> {
        sqlx::query(
            r#"
            UPDATE branches SET
                indexed_commit_sha = $3,
                index_state = 'completed',
                last_indexed_at = now(),
                updated_at = now()
            WHERE repo_id = $1 AND name = $2
            "#,
        )
        .bind(repo_id)
        .bind(name)
        .bind(sha)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn touch_branch(&self, repo_id: RepoId, name: &str) -> lode_core::Result<()> {
        sqlx::query(
            "UPDATE branches SET last_accessed_at = now() WHERE repo_id = $1 AND name = $2",
        )
        .bind(repo_id)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a commit row inside the batch transaction. Idempotent on
    /// `(repo, sha, branch)`.
    pub async fn insert_commit(conn: &mut PgConnection, commit: &Commit) -> lode_core::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO commits (id, repo_id, sha, branch_name, author_name, author_email, committed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (repo_id, sha, branch_name) DO NOTHING
            "#,
        )
        .bind(commit.id)
        .bind(commit.repo_id)
        .bind(&commit.sha)
        .bind(&commit.branch_name)
        .bind(&commit.author_name)
        .bind(&commit.author_email)
        .bind(commit.committed_at)
        .execute(conn)
        .await?;

        Ok(())
    }
}
