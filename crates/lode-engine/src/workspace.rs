//! Project workspace cache.
//!
//! Semantic parsing benefits from project context (which project files
//! exist, where the source roots are). Workspaces are expensive to
//! discover, so they are cached per `(repo path, branch)` and handed out
//! as reference-counted handles: an entry marked for disposal is only
//! dropped once the last handle releases, so teardown never races an
//! in-flight parse.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use dashmap::DashMap;
use tokio::sync::Mutex;

/// Directories never scanned during project discovery.
const EXCLUDED_DIRS: &[&str] = &[
    ".git", ".idea", ".vs", "bin", "build", "dist", "node_modules", "obj", "packages", "target",
];

/// Project/solution file extensions that mark a workspace root.
const PROJECT_EXTENSIONS: &[&str] = &["csproj", "sln", "slnx"];

type Key = (PathBuf, String);

/// Discovered project context for one `(repo path, branch)`.
#[derive(Debug)]
pub struct ProjectWorkspace {
    pub repo_path: PathBuf,
    pub branch: String,
    pub project_files: Vec<PathBuf>,
}

struct Entry {
    workspace: Arc<ProjectWorkspace>,
    ref_count: usize,
    marked_for_disposal: bool,
}

/// Scoped reference to a cached workspace. Dropping the handle releases
/// the reference; the entry disposes when marked and unreferenced.
pub struct WorkspaceHandle {
    workspace: Arc<ProjectWorkspace>,
    key: Key,
    entries: Arc<StdMutex<HashMap<Key, Entry>>>,
}

impl std::ops::Deref for WorkspaceHandle {
    type Target = ProjectWorkspace;

    fn deref(&self) -> &Self::Target {
        &self.workspace
    }
}

impl Drop for WorkspaceHandle {
    fn drop(&mut self) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            if entry.ref_count == 0 && entry.marked_for_disposal {
                entries.remove(&self.key);
            }
        }
    }
}

/// Concurrent cache of project workspaces.
pub struct WorkspaceLoader {
    entries: Arc<StdMutex<HashMap<Key, Entry>>>,
    /// Per-key load locks so two tasks never discover the same workspace
    /// concurrently.
    key_locks: DashMap<Key, Arc<Mutex<()>>>,
}

impl WorkspaceLoader {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(StdMutex::new(HashMap::new())),
            key_locks: DashMap::new(),
        }
    }

    /// Acquire a handle for `(repo_path, branch)`, discovering the
    /// workspace on first use. Returns `None` when discovery fails; a
    /// partially-initialised workspace is never cached.
    pub async fn acquire(&self, repo_path: &Path, branch: &str) -> Option<WorkspaceHandle> {
        let key = (repo_path.to_path_buf(), branch.to_string());

        let key_lock = self
            .key_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _load_guard = key_lock.lock().await;

        {
            let mut entries = self.lock_entries();
            if let Some(entry) = entries.get_mut(&key) {
                if !entry.marked_for_disposal {
                    entry.ref_count += 1;
                    return Some(WorkspaceHandle {
                        workspace: Arc::clone(&entry.workspace),
                        key,
                        entries: Arc::clone(&self.entries),
                    });
                }
            }
        }

        let workspace = match discover(repo_path, branch) {
            Some(ws) => Arc::new(ws),
            None => {
                tracing::warn!(path = %repo_path.display(), branch, "workspace discovery failed");
                return None;
            }
        };

        let mut entries = self.lock_entries();
        entries.insert(
            key.clone(),
            Entry {
                workspace: Arc::clone(&workspace),
                ref_count: 1,
                marked_for_disposal: false,
            },
        );

        Some(WorkspaceHandle {
            workspace,
            key,
            entries: Arc::clone(&self.entries),
        })
    }

    /// Mark entries of a repository (optionally one branch) for disposal
    /// and drop their load locks. Unreferenced entries go immediately;
    /// referenced ones dispose when the last handle releases.
    pub fn clear(&self, repo_path: &Path, branch: Option<&str>) {
        let mut entries = self.lock_entries();
        let keys: Vec<Key> = entries
            .keys()
            .filter(|(path, b)| path == repo_path && branch.is_none_or(|want| want == b))
            .cloned()
            .collect();

        for key in keys {
            if let Some(entry) = entries.get_mut(&key) {
                if entry.ref_count == 0 {
                    entries.remove(&key);
                } else {
                    entry.marked_for_disposal = true;
                }
            }
            self.key_locks.remove(&key);
        }
    }

    /// Number of live cache entries (including marked ones still held).
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<Key, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for WorkspaceLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan the repository for project/solution files, skipping build and IDE
/// output directories.
fn discover(repo_path: &Path, branch: &str) -> Option<ProjectWorkspace> {
    if !repo_path.is_dir() {
        return None;
    }

    let mut project_files = Vec::new();
    let mut stack = vec![repo_path.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if EXCLUDED_DIRS.contains(&name) || name.starts_with('.') {
                    continue;
                }
                stack.push(path);
            } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                if PROJECT_EXTENSIONS.contains(&ext) {
                    project_files.push(path);
                }
            }
        }
    }

    project_files.sort();
    Some(ProjectWorkspace {
        repo_path: repo_path.to_path_buf(),
        branch: branch.to_string(),
        project_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/App")).unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("App.sln"), "").unwrap();
        std::fs::write(dir.path().join("src/App/App.csproj"), "").unwrap();
        std::fs::write(dir.path().join("bin/Ignored.csproj"), "").unwrap();
        dir
    }

    #[tokio::test]
    async fn discovers_projects_excluding_build_dirs() {
        let dir = fixture_repo();
        let loader = WorkspaceLoader::new();

        let handle = loader.acquire(dir.path(), "main").await.unwrap();
        assert_eq!(handle.project_files.len(), 2);
        assert!(handle
            .project_files
            .iter()
            .all(|p| !p.starts_with(dir.path().join("bin"))));
    }

    #[tokio::test]
    async fn acquire_shares_one_entry() {
        let dir = fixture_repo();
        let loader = WorkspaceLoader::new();

        let a = loader.acquire(dir.path(), "main").await.unwrap();
        let b = loader.acquire(dir.path(), "main").await.unwrap();
        assert_eq!(loader.len(), 1);
        assert!(Arc::ptr_eq(&a.workspace, &b.workspace));
    }

    #[tokio::test]
    async fn clear_defers_disposal_until_release() {
        let dir = fixture_repo();
        let loader = WorkspaceLoader::new();

        let handle = loader.acquire(dir.path(), "main").await.unwrap();
        loader.clear(dir.path(), Some("main"));
        // Entry survives while the handle is live.
        assert_eq!(loader.len(), 1);

        drop(handle);
        assert_eq!(loader.len(), 0);
    }

    #[tokio::test]
    async fn clear_removes_unreferenced_entries_immediately() {
        let dir = fixture_repo();
        let loader = WorkspaceLoader::new();

        let handle = loader.acquire(dir.path(), "main").await.unwrap();
        drop(handle);
        loader.clear(dir.path(), None);
        assert!(loader.is_empty());
    }

    #[tokio::test]
    async fn missing_path_yields_none() {
        let loader = WorkspaceLoader::new();
        assert!(loader
            .acquire(Path::new("/nonexistent/repo"), "main")
            .await
            .is_none());
    }
}
