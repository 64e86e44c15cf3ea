//! Store and resolver behaviour against a real PostgreSQL instance.
//!
//! These tests connect via `DATABASE_URL` and skip silently when it is
//! not set, so the suite passes on machines without a provisioned
//! database. The database needs the pgvector extension available.

use chrono::Utc;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use lode_core::{
    Edge, EdgeKind, EmbeddingJob, IndexState, JobStatus, Language, RawEdge, Span, Symbol,
    SymbolKind,
};
use lode_engine::resolver::EdgeResolver;
use lode_engine::store::{ChunkStore, EdgeStore, JobStore, Store, SymbolStore};

async fn setup_store() -> Option<Store> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("skipping: DATABASE_URL not set");
        return None;
    };

    let pool = PgPool::connect(&url)
        .await
        .expect("failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    Some(Store::new(pool))
}

fn make_symbol(repo_id: Uuid, branch: &str, file: &str, name: &str, qualified: &str) -> Symbol {
    Symbol {
        id: Uuid::new_v4(),
        repo_id,
        branch_name: branch.to_string(),
        file_path: file.to_string(),
        commit_sha: "sha-1".to_string(),
        name: name.to_string(),
        qualified_name: Some(qualified.to_string()),
        kind: SymbolKind::Method,
        language: Language::CSharp,
        span: Span {
            start_line: 1,
            start_col: 1,
            end_line: 10,
            end_col: 2,
        },
        signature: Some(format!("public void {name}()")),
        documentation: None,
        modifiers: vec!["public".to_string()],
        parent_symbol_id: None,
    }
}

async fn create_repo(store: &Store) -> lode_core::Repository {
    let name = format!("test-repo-{}", Uuid::new_v4());
    store
        .repos
        .ensure_repository(&name, "https://example.invalid/repo.git", "main")
        .await
        .expect("create repo")
}

async fn cleanup_repo(store: &Store, repo_id: Uuid) {
    sqlx::query("DELETE FROM repositories WHERE id = $1")
        .bind(repo_id)
        .execute(store.pool())
        .await
        .expect("cleanup repo");
}

#[tokio::test]
async fn repository_upsert_is_idempotent() {
    let Some(store) = setup_store().await else { return };
    let repo = create_repo(&store).await;

    let again = store
        .repos
        .ensure_repository(&repo.name, "https://example.invalid/other.git", "main")
        .await
        .unwrap();
    assert_eq!(again.id, repo.id);
    assert_eq!(again.remote_url, "https://example.invalid/other.git");

    cleanup_repo(&store, repo.id).await;
}

#[tokio::test]
async fn branch_head_change_flips_state_to_stale() {
    let Some(store) = setup_store().await else { return };
    let repo = create_repo(&store).await;

    let branch = store.repos.upsert_branch(repo.id, "main", "aaa").await.unwrap();
    assert_eq!(branch.index_state, IndexState::Pending);

    store.repos.mark_indexed(repo.id, "main", "aaa").await.unwrap();
    let branch = store.repos.branch(repo.id, "main").await.unwrap().unwrap();
    assert_eq!(branch.index_state, IndexState::Completed);
    assert_eq!(branch.indexed_commit_sha.as_deref(), Some("aaa"));

    // Same head: state survives.
    let branch = store.repos.upsert_branch(repo.id, "main", "aaa").await.unwrap();
    assert_eq!(branch.index_state, IndexState::Completed);

    // New head: stale.
    let branch = store.repos.upsert_branch(repo.id, "main", "bbb").await.unwrap();
    assert_eq!(branch.index_state, IndexState::Stale);

    // mark_indexed is idempotent for the same (repo, branch, sha).
    store.repos.mark_indexed(repo.id, "main", "bbb").await.unwrap();
    store.repos.mark_indexed(repo.id, "main", "bbb").await.unwrap();
    let branch = store.repos.branch(repo.id, "main").await.unwrap().unwrap();
    assert_eq!(branch.indexed_commit_sha.as_deref(), Some("bbb"));

    cleanup_repo(&store, repo.id).await;
}

#[tokio::test]
async fn deleting_file_symbols_cascades_to_owned_rows() {
    let Some(store) = setup_store().await else { return };
    let repo = create_repo(&store).await;

    let sym_a = make_symbol(repo.id, "main", "src/a.cs", "Alpha", "App.Alpha");
    let sym_b = make_symbol(repo.id, "main", "src/a.cs", "Beta", "App.Beta");

    let mut tx = store.begin().await.unwrap();
    SymbolStore::insert_batch(&mut tx, &[sym_a.clone(), sym_b.clone()])
        .await
        .unwrap();
    EdgeStore::insert_batch(
        &mut tx,
        &[Edge {
            id: Uuid::new_v4(),
            repo_id: repo.id,
            branch_name: "main".into(),
            commit_sha: "sha-1".into(),
            source_symbol_id: sym_a.id,
            target_symbol_id: sym_b.id,
            kind: EdgeKind::Calls,
        }],
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(store.edges.count(repo.id, "main").await.unwrap(), 1);

    let mut tx = store.begin().await.unwrap();
    let deleted = SymbolStore::delete_by_file(&mut tx, repo.id, "main", "src/a.cs")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(deleted, 2);
    assert_eq!(store.edges.count(repo.id, "main").await.unwrap(), 0);
    assert!(store.symbols.get_by_id(sym_a.id).await.unwrap().is_none());

    cleanup_repo(&store, repo.id).await;
}

#[tokio::test]
async fn edge_insert_is_idempotent_on_identity() {
    let Some(store) = setup_store().await else { return };
    let repo = create_repo(&store).await;

    let sym_a = make_symbol(repo.id, "main", "src/a.cs", "Alpha", "App.Alpha");
    let sym_b = make_symbol(repo.id, "main", "src/a.cs", "Beta", "App.Beta");

    let edge = |id: Uuid| Edge {
        id,
        repo_id: repo.id,
        branch_name: "main".into(),
        commit_sha: "sha-1".into(),
        source_symbol_id: sym_a.id,
        target_symbol_id: sym_b.id,
        kind: EdgeKind::Calls,
    };

    let mut tx = store.begin().await.unwrap();
    SymbolStore::insert_batch(&mut tx, &[sym_a.clone(), sym_b.clone()])
        .await
        .unwrap();
    EdgeStore::insert_batch(&mut tx, &[edge(Uuid::new_v4()), edge(Uuid::new_v4())])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(store.edges.count(repo.id, "main").await.unwrap(), 1);

    cleanup_repo(&store, repo.id).await;
}

#[tokio::test]
async fn job_queue_claim_is_atomic_and_leased() {
    let Some(store) = setup_store().await else { return };
    let repo = create_repo(&store).await;

    let chunk_id = Uuid::new_v4();
    let job = EmbeddingJob {
        id: Uuid::new_v4(),
        repo_id: repo.id,
        branch_name: "main".into(),
        commit_sha: "sha-1".into(),
        target_kind: "code_chunk".into(),
        target_id: chunk_id,
        model: "test-model".into(),
        dims: None,
        status: JobStatus::Pending,
        attempts: 0,
        next_attempt_at: Utc::now(),
        locked_by: None,
        locked_at: None,
        last_error: None,
    };

    let mut tx = store.begin().await.unwrap();
    JobStore::enqueue_batch(&mut tx, &[job.clone()]).await.unwrap();
    tx.commit().await.unwrap();

    // Claim moves the job in-progress and counts the attempt.
    let claimed = store.jobs.claim("worker-a", 10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].status, JobStatus::InProgress);
    assert_eq!(claimed[0].attempts, 1);
    assert_eq!(claimed[0].locked_by.as_deref(), Some("worker-a"));

    // A second worker sees nothing.
    assert!(store.jobs.claim("worker-b", 10).await.unwrap().is_empty());

    // An expired lease is requeued and claimable again. The cutoff is in
    // the future so the fresh lease counts as expired regardless of any
    // client/server clock skew.
    let requeued = store
        .jobs
        .requeue_stale(Utc::now() + chrono::Duration::minutes(5))
        .await
        .unwrap();
    assert!(requeued >= 1);
    let reclaimed = store.jobs.claim("worker-b", 10).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].attempts, 2);

    // Completion is terminal; re-enqueueing the same target is a no-op.
    store.jobs.complete(job.id, Some(768), None).await.unwrap();
    let mut tx = store.begin().await.unwrap();
    JobStore::enqueue_batch(
        &mut tx,
        &[EmbeddingJob {
            id: Uuid::new_v4(),
            ..job.clone()
        }],
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let row = store.jobs.get(job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Completed);
    assert_eq!(row.dims, Some(768));
    assert!(store.jobs.claim("worker-c", 10).await.unwrap().is_empty());

    // Cleanup: jobs have no FK to repositories.
    sqlx::query("DELETE FROM embedding_jobs WHERE repo_id = $1")
        .bind(repo.id)
        .execute(store.pool())
        .await
        .unwrap();
    cleanup_repo(&store, repo.id).await;
}

#[tokio::test]
async fn retry_backoff_respects_next_attempt_at() {
    let Some(store) = setup_store().await else { return };
    let repo = create_repo(&store).await;

    let job = EmbeddingJob {
        id: Uuid::new_v4(),
        repo_id: repo.id,
        branch_name: "main".into(),
        commit_sha: "sha-1".into(),
        target_kind: "code_chunk".into(),
        target_id: Uuid::new_v4(),
        model: "test-model".into(),
        dims: None,
        status: JobStatus::Pending,
        attempts: 0,
        next_attempt_at: Utc::now(),
        locked_by: None,
        locked_at: None,
        last_error: None,
    };

    let mut tx = store.begin().await.unwrap();
    JobStore::enqueue_batch(&mut tx, &[job.clone()]).await.unwrap();
    tx.commit().await.unwrap();

    store.jobs.claim("worker-a", 10).await.unwrap();
    store
        .jobs
        .retry_at(job.id, Utc::now() + chrono::Duration::hours(1), "provider_error: 503")
        .await
        .unwrap();

    // Not due yet.
    assert!(store.jobs.claim("worker-a", 10).await.unwrap().is_empty());
    let row = store.jobs.get(job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Pending);
    assert!(row.last_error.unwrap().starts_with("provider_error"));

    sqlx::query("DELETE FROM embedding_jobs WHERE repo_id = $1")
        .bind(repo.id)
        .execute(store.pool())
        .await
        .unwrap();
    cleanup_repo(&store, repo.id).await;
}

#[tokio::test]
async fn resolver_resolves_exact_and_drops_ambiguous() {
    let Some(store) = setup_store().await else { return };
    let repo = create_repo(&store).await;

    let caller = make_symbol(repo.id, "main", "src/caller.cs", "DoWork", "App.Caller.DoWork");
    let exact = make_symbol(repo.id, "main", "src/c.cs", "Exact", "App.C.Exact");
    let overload_a = make_symbol(repo.id, "main", "src/c.cs", "M", "App.C.M(int,bool)");
    let overload_b = make_symbol(repo.id, "main", "src/c.cs", "M", "App.C.M()");
    let mut overload_b = overload_b;
    overload_b.span.start_line = 20;
    overload_b.span.end_line = 30;

    let batch = vec![caller.clone(), exact.clone(), overload_a.clone(), overload_b.clone()];
    let raw_edges = vec![
        // Case-insensitive exact match.
        RawEdge {
            source_symbol_id: caller.id,
            target: "app.c.exact".into(),
            kind: EdgeKind::Calls,
        },
        // Two stripped candidates → dropped, never guessed.
        RawEdge {
            source_symbol_id: caller.id,
            target: "App.C.M(int)".into(),
            kind: EdgeKind::Calls,
        },
        // External reference → dropped.
        RawEdge {
            source_symbol_id: caller.id,
            target: "System.Console.WriteLine".into(),
            kind: EdgeKind::Calls,
        },
    ];

    let mut tx = store.begin().await.unwrap();
    SymbolStore::insert_batch(&mut tx, &batch).await.unwrap();
    let outcome = EdgeResolver::resolve(&mut tx, repo.id, "main", "sha-1", &raw_edges, &batch)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(outcome.resolved, 1);
    assert_eq!(outcome.discarded, 2);
    assert_eq!(outcome.edges.len(), 1);
    assert_eq!(outcome.edges[0].target_symbol_id, exact.id);

    cleanup_repo(&store, repo.id).await;
}

#[tokio::test]
async fn resolver_unique_stripped_candidate_is_accepted() {
    let Some(store) = setup_store().await else { return };
    let repo = create_repo(&store).await;

    let caller = make_symbol(repo.id, "main", "src/caller.cs", "DoWork", "App.Caller.DoWork");
    let only = make_symbol(repo.id, "main", "src/c.cs", "M", "App.C.M(string)");

    let batch = vec![caller.clone(), only.clone()];
    let raw_edges = vec![RawEdge {
        source_symbol_id: caller.id,
        target: "App.C.M(int)".into(),
        kind: EdgeKind::Calls,
    }];

    let mut tx = store.begin().await.unwrap();
    SymbolStore::insert_batch(&mut tx, &batch).await.unwrap();
    let outcome = EdgeResolver::resolve(&mut tx, repo.id, "main", "sha-1", &raw_edges, &batch)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(outcome.resolved, 1);
    assert_eq!(outcome.edges[0].target_symbol_id, only.id);

    cleanup_repo(&store, repo.id).await;
}

#[tokio::test]
async fn resolver_local_scope_fallback_finds_sibling_members() {
    let Some(store) = setup_store().await else { return };
    let repo = create_repo(&store).await;

    let mut class = make_symbol(repo.id, "main", "src/svc.cs", "Service", "App.Service");
    class.kind = SymbolKind::Class;
    let mut login = make_symbol(repo.id, "main", "src/svc.cs", "Login", "App.Service.Login");
    login.parent_symbol_id = Some(class.id);
    login.span.start_line = 12;
    login.span.end_line = 20;
    let mut helper = make_symbol(repo.id, "main", "src/svc.cs", "Check", "App.Service.Check");
    helper.parent_symbol_id = Some(class.id);
    helper.span.start_line = 22;
    helper.span.end_line = 30;

    let batch = vec![class.clone(), login.clone(), helper.clone()];
    // Target resolvable only through the shared parent's children.
    let raw_edges = vec![RawEdge {
        source_symbol_id: login.id,
        target: "Unknown.Path.Check".into(),
        kind: EdgeKind::Calls,
    }];

    let mut tx = store.begin().await.unwrap();
    SymbolStore::insert_batch(&mut tx, &batch).await.unwrap();
    let outcome = EdgeResolver::resolve(&mut tx, repo.id, "main", "sha-1", &raw_edges, &batch)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(outcome.resolved, 1);
    assert_eq!(outcome.edges[0].target_symbol_id, helper.id);

    cleanup_repo(&store, repo.id).await;
}

#[tokio::test]
async fn resolution_never_crosses_repositories() {
    let Some(store) = setup_store().await else { return };
    let repo_a = create_repo(&store).await;
    let repo_b = create_repo(&store).await;

    // Target exists only in repo B.
    let foreign = make_symbol(repo_b.id, "main", "src/b.cs", "Target", "App.Target");
    let mut tx = store.begin().await.unwrap();
    SymbolStore::insert_batch(&mut tx, &[foreign.clone()]).await.unwrap();
    tx.commit().await.unwrap();

    let caller = make_symbol(repo_a.id, "main", "src/a.cs", "Caller", "App.Caller");
    let raw_edges = vec![RawEdge {
        source_symbol_id: caller.id,
        target: "App.Target".into(),
        kind: EdgeKind::Calls,
    }];

    let mut tx = store.begin().await.unwrap();
    SymbolStore::insert_batch(&mut tx, std::slice::from_ref(&caller))
        .await
        .unwrap();
    let outcome = EdgeResolver::resolve(
        &mut tx,
        repo_a.id,
        "main",
        "sha-1",
        &raw_edges,
        std::slice::from_ref(&caller),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(outcome.resolved, 0);
    assert_eq!(outcome.discarded, 1);

    cleanup_repo(&store, repo_a.id).await;
    cleanup_repo(&store, repo_b.id).await;
}

#[tokio::test]
async fn chunk_rows_replace_on_identity_conflict() {
    let Some(store) = setup_store().await else { return };
    let repo = create_repo(&store).await;

    let symbol = make_symbol(repo.id, "main", "src/a.cs", "Alpha", "App.Alpha");
    let chunk = lode_core::CodeChunk {
        id: Uuid::new_v4(),
        repo_id: repo.id,
        branch_name: "main".into(),
        file_path: "src/a.cs".into(),
        symbol_id: Some(symbol.id),
        symbol_name: "Alpha".into(),
        symbol_kind: SymbolKind::Method,
        language: Language::CSharp,
        content: "first version".into(),
        chunk_start_line: 1,
        chunk_end_line: 12,
        symbol_start_line: 3,
        symbol_end_line: 9,
        token_count: 3,
        parent_symbol_name: None,
        signature: None,
        documentation: None,
    };

    let mut tx = store.begin().await.unwrap();
    SymbolStore::insert_batch(&mut tx, std::slice::from_ref(&symbol))
        .await
        .unwrap();
    ChunkStore::insert_batch(&mut tx, std::slice::from_ref(&chunk))
        .await
        .unwrap();

    let mut updated = chunk.clone();
    updated.id = Uuid::new_v4();
    updated.content = "second version".into();
    ChunkStore::insert_batch(&mut tx, std::slice::from_ref(&updated))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // Same (repo, branch, file, window) identity → one row, latest wins.
    let row = store.chunks.get_by_id(chunk.id).await.unwrap().unwrap();
    assert_eq!(row.content, "second version");

    cleanup_repo(&store, repo.id).await;
}
