//! Repository and branch lifecycle tracking.
//!
//! One working tree per repository lives under the configured working
//! directory. Clone and fetch shell out to the `git` binary, which keeps
//! remote authentication fully delegated to git's own credential
//! machinery. All mutating operations on one repository are serialised by
//! a per-repository async mutex; reads go through the object database
//! ([`GitRepository`]) and never touch the checkout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use lode_core::config::GitConfig;
use lode_core::{Branch, ChangeKind, Error, FileChange, RepoId, Repository, Result};

use super::objects::GitRepository;
use crate::store::RepoStore;

struct RepoState {
    path: PathBuf,
    default_branch: String,
    lock: Mutex<()>,
    /// In-memory branch access times, swept by the cleanup scheduler.
    branches: DashMap<String, DateTime<Utc>>,
}

/// Tracks repositories and branches, detects changes since the last
/// indexed commit, and serves blob content.
pub struct GitTracker {
    config: GitConfig,
    repos: RepoStore,
    state: DashMap<RepoId, Arc<RepoState>>,
}

impl GitTracker {
    pub fn new(config: GitConfig, repos: RepoStore) -> Self {
        Self {
            config,
            repos,
            state: DashMap::new(),
        }
    }

    /// Ensure the repository row and its local clone exist.
    pub async fn ensure_repository(
        &self,
        name: &str,
        remote_url: &str,
        default_branch: &str,
    ) -> Result<Repository> {
        let repo = self
            .repos
            .ensure_repository(name, remote_url, default_branch)
            .await?;

        let state = self.state_for(&repo);
        let _guard = state.lock.lock().await;

        if !state.path.join(".git").exists() {
            tokio::fs::create_dir_all(
                state.path.parent().unwrap_or(&self.config.working_directory),
            )
            .await?;
            tracing::info!(repo = name, "cloning {remote_url}");
            run_git(
                &self.config.working_directory,
                &["clone", remote_url, &state.path.to_string_lossy()],
            )
            .await?;
        }

        Ok(repo)
    }

    /// Fetch the branch from origin and persist its observed HEAD.
    ///
    /// A HEAD change flips the branch row to `Stale`; a new branch starts
    /// `Pending`.
    pub async fn ensure_branch(&self, repo: &Repository, branch: &str) -> Result<Branch> {
        let state = self.state_for(repo);
        let _guard = state.lock.lock().await;

        if let Err(e) = run_git(&state.path, &["fetch", "origin", branch]).await {
            tracing::warn!(repo = %repo.name, branch, "fetch failed: {e}");
        }

        let git = GitRepository::open(&state.path)?;
        let sha = git
            .remote_branch_sha(branch)?
            .ok_or_else(|| Error::BranchNotFound(format!("{}/{branch}", repo.name)))?;

        state.branches.insert(branch.to_string(), Utc::now());
        self.repos.upsert_branch(repo.id, branch, &sha).await
    }

    /// Compute the file changes between the last indexed commit and the
    /// current HEAD of a branch. With no indexed commit yet, every blob
    /// reachable from HEAD is `Added`.
    pub async fn changes(&self, repo: &Repository, branch: &str) -> Result<Vec<FileChange>> {
        let row = self
            .repos
            .branch(repo.id, branch)
            .await?
            .ok_or_else(|| Error::BranchNotFound(format!("{}/{branch}", repo.name)))?;

        let state = self.state_for(repo);
        let git = GitRepository::open(&state.path)?;

        match &row.indexed_commit_sha {
            None => {
                let files = git.list_files(&row.head_commit_sha)?;
                Ok(files
                    .into_iter()
                    .map(|path| FileChange {
                        path,
                        old_path: None,
                        kind: ChangeKind::Added,
                    })
                    .collect())
            }
            Some(indexed) if indexed == &row.head_commit_sha => Ok(Vec::new()),
            Some(indexed) => {
                let output = run_git(
                    &state.path,
                    &["diff", "--name-status", "-M", indexed, &row.head_commit_sha],
                )
                .await?;
                Ok(parse_name_status(&output))
            }
        }
    }

    /// Read file content from the object database at an exact commit.
    pub async fn file_content(
        &self,
        repo: &Repository,
        commit_sha: &str,
        path: &str,
    ) -> Result<Option<String>> {
        let state = self.state_for(repo);
        let git = GitRepository::open(&state.path)?;
        git.read_blob_text(commit_sha, path)
    }

    pub async fn blob_size(
        &self,
        repo: &Repository,
        commit_sha: &str,
        path: &str,
    ) -> Result<Option<u64>> {
        let state = self.state_for(repo);
        let git = GitRepository::open(&state.path)?;
        git.blob_size(commit_sha, path)
    }

    /// Author metadata for a commit, if present.
    pub async fn commit_meta(
        &self,
        repo: &Repository,
        commit_sha: &str,
    ) -> Result<super::objects::CommitMeta> {
        let state = self.state_for(repo);
        let git = GitRepository::open(&state.path)?;
        git.commit_meta(commit_sha)
    }

    /// Record a successful index of the branch's current HEAD.
    pub async fn mark_indexed(&self, repo: &Repository, branch: &str) -> Result<()> {
        let row = self
            .repos
            .branch(repo.id, branch)
            .await?
            .ok_or_else(|| Error::BranchNotFound(format!("{}/{branch}", repo.name)))?;

        self.repos
            .mark_indexed(repo.id, branch, &row.head_commit_sha)
            .await
    }

    /// Drop in-memory branches not accessed since the stale cutoff. The
    /// default branch is never dropped. Shares each repository's update
    /// lock so a sweep cannot overlap a fetch.
    pub async fn sweep_stale_branches(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(self.config.stale_branch_days);
        let mut dropped = 0;

        for entry in self.state.iter() {
            let state = entry.value().clone();
            let _guard = state.lock.lock().await;

            let stale: Vec<String> = state
                .branches
                .iter()
                .filter(|b| *b.value() < cutoff && *b.key() != state.default_branch)
                .map(|b| b.key().clone())
                .collect();

            for name in stale {
                state.branches.remove(&name);
                dropped += 1;
            }
        }

        dropped
    }

    /// On-disk path of a repository's working tree.
    pub fn repo_path(&self, repo: &Repository) -> PathBuf {
        self.state_for(repo).path.clone()
    }

    fn state_for(&self, repo: &Repository) -> Arc<RepoState> {
        self.state
            .entry(repo.id)
            .or_insert_with(|| {
                Arc::new(RepoState {
                    path: self
                        .config
                        .working_directory
                        .join(sanitize_repo_name(&repo.name)),
                    default_branch: repo.default_branch.clone(),
                    lock: Mutex::new(()),
                    branches: DashMap::new(),
                })
            })
            .clone()
    }
}

/// Map a repository name to a filesystem-safe directory name.
fn sanitize_repo_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Parse `git diff --name-status -M` output into file changes.
fn parse_name_status(output: &str) -> Vec<FileChange> {
    let mut changes = Vec::new();

    for line in output.lines() {
        let mut parts = line.split('\t');
        let Some(status) = parts.next() else { continue };
        let Some(first_path) = parts.next() else { continue };

        match status.chars().next() {
            Some('A') => changes.push(FileChange {
                path: first_path.to_string(),
                old_path: None,
                kind: ChangeKind::Added,
            }),
            Some('M') | Some('T') => changes.push(FileChange {
                path: first_path.to_string(),
                old_path: None,
                kind: ChangeKind::Modified,
            }),
            Some('D') => changes.push(FileChange {
                path: first_path.to_string(),
                old_path: None,
                kind: ChangeKind::Deleted,
            }),
            Some('R') => {
                if let Some(new_path) = parts.next() {
                    changes.push(FileChange {
                        path: new_path.to_string(),
                        old_path: Some(first_path.to_string()),
                        kind: ChangeKind::Renamed,
                    });
                }
            }
            Some('C') => {
                if let Some(new_path) = parts.next() {
                    changes.push(FileChange {
                        path: new_path.to_string(),
                        old_path: None,
                        kind: ChangeKind::Added,
                    });
                }
            }
            _ => {}
        }
    }

    changes
}

async fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| Error::Git(format!("failed to spawn git: {e}")))?;

    if !output.status.success() {
        return Err(Error::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_repo_names() {
        assert_eq!(sanitize_repo_name("org/repo"), "org_repo");
        assert_eq!(sanitize_repo_name("my-repo.git"), "my-repo.git");
        assert_eq!(sanitize_repo_name("weird name!"), "weird_name_");
    }

    #[test]
    fn parses_name_status_lines() {
        let output = "A\tsrc/new.rs\nM\tsrc/changed.rs\nD\tsrc/gone.rs\nR087\tsrc/old.rs\tsrc/renamed.rs\n";
        let changes = parse_name_status(output);

        assert_eq!(changes.len(), 4);
        assert_eq!(changes[0].kind, ChangeKind::Added);
        assert_eq!(changes[1].kind, ChangeKind::Modified);
        assert_eq!(changes[2].kind, ChangeKind::Deleted);
        assert_eq!(changes[3].kind, ChangeKind::Renamed);
        assert_eq!(changes[3].path, "src/renamed.rs");
        assert_eq!(changes[3].old_path.as_deref(), Some("src/old.rs"));
    }

    #[test]
    fn ignores_malformed_diff_lines() {
        assert!(parse_name_status("garbage\n\n").is_empty());
    }
}
