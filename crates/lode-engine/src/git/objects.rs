use std::path::Path;

use chrono::{DateTime, Utc};
use lode_core::{Error, Result};

/// A wrapper around `gix::Repository` for object-database reads.
///
/// All content access goes through the ODB — never the working tree — so
/// reads always reflect an exact commit, regardless of what a concurrent
/// fetch does to the checkout.
pub struct GitRepository {
    inner: gix::Repository,
}

/// Author/committer metadata of one commit.
#[derive(Debug, Clone)]
pub struct CommitMeta {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub committed_at: Option<DateTime<Utc>>,
}

impl GitRepository {
    /// Open an existing repository at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = gix::open(path).map_err(|e| {
            Error::Git(format!("failed to open repository at {}: {}", path.display(), e))
        })?;

        Ok(Self { inner: repo })
    }

    /// Resolve the commit sha of `refs/remotes/origin/<branch>`, or `None`
    /// when the remote branch does not exist locally.
    pub fn remote_branch_sha(&self, branch: &str) -> Result<Option<String>> {
        let name = format!("refs/remotes/origin/{branch}");
        let reference = match self.inner.try_find_reference(&name) {
            Ok(Some(r)) => r,
            Ok(None) => return Ok(None),
            Err(e) => return Err(Error::Git(format!("failed to find {name}: {e}"))),
        };

        let id = reference
            .into_fully_peeled_id()
            .map_err(|e| Error::Git(format!("failed to peel {name}: {e}")))?;

        Ok(Some(id.to_hex().to_string()))
    }

    /// Read a file's text content from a specific commit's tree.
    ///
    /// Returns `None` when the path is absent, is not a blob, or the blob
    /// is binary (NUL byte in the leading window).
    pub fn read_blob_text(&self, commit_hex: &str, path: &str) -> Result<Option<String>> {
        let tree = match self.tree_of(commit_hex) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!(commit = commit_hex, "missing commit: {e}");
                return Ok(None);
            }
        };

        let Some(entry) = tree
            .lookup_entry_by_path(path)
            .map_err(|e| Error::Git(format!("failed to lookup '{path}' in {commit_hex}: {e}")))?
        else {
            return Ok(None);
        };

        let object = entry
            .object()
            .map_err(|e| Error::Git(format!("failed to read object for '{path}': {e}")))?;

        if object.kind != gix::object::Kind::Blob {
            return Ok(None);
        }

        let data = &object.data;
        if is_binary(data) {
            return Ok(None);
        }

        Ok(Some(String::from_utf8_lossy(data).into_owned()))
    }

    /// Size in bytes of a blob at `path`, or `None` when absent.
    pub fn blob_size(&self, commit_hex: &str, path: &str) -> Result<Option<u64>> {
        let tree = match self.tree_of(commit_hex) {
            Ok(tree) => tree,
            Err(_) => return Ok(None),
        };

        let Some(entry) = tree
            .lookup_entry_by_path(path)
            .map_err(|e| Error::Git(format!("failed to lookup '{path}' in {commit_hex}: {e}")))?
        else {
            return Ok(None);
        };

        let object = entry
            .object()
            .map_err(|e| Error::Git(format!("failed to read object for '{path}': {e}")))?;

        if object.kind != gix::object::Kind::Blob {
            return Ok(None);
        }
        Ok(Some(object.data.len() as u64))
    }

    /// List every blob path reachable from a commit's tree, recursively,
    /// with forward-slash separators.
    pub fn list_files(&self, commit_hex: &str) -> Result<Vec<String>> {
        let tree = self.tree_of(commit_hex)?;

        let entries = tree
            .traverse()
            .breadthfirst
            .files()
            .map_err(|e| Error::Git(format!("tree traversal failed for {commit_hex}: {e}")))?;

        let paths = entries
            .into_iter()
            .filter(|e| !e.mode.is_tree())
            .map(|e| e.filepath.to_string())
            .collect();

        Ok(paths)
    }

    /// Author metadata for a commit. Absent pieces come back `None` rather
    /// than failing the index.
    pub fn commit_meta(&self, commit_hex: &str) -> Result<CommitMeta> {
        let oid = gix::ObjectId::from_hex(commit_hex.as_bytes())
            .map_err(|e| Error::Git(format!("invalid commit hex '{commit_hex}': {e}")))?;

        let commit = self
            .inner
            .find_commit(oid)
            .map_err(|e| Error::Git(format!("failed to find commit {commit_hex}: {e}")))?;

        let (author_name, author_email) = match commit.author() {
            Ok(sig) => (
                Some(sig.name.to_string()),
                Some(sig.email.to_string()),
            ),
            Err(_) => (None, None),
        };

        let committed_at = commit
            .time()
            .ok()
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.seconds, 0));

        Ok(CommitMeta {
            author_name,
            author_email,
            committed_at,
        })
    }

    fn tree_of(&self, commit_hex: &str) -> Result<gix::Tree<'_>> {
        let oid = gix::ObjectId::from_hex(commit_hex.as_bytes())
            .map_err(|e| Error::Git(format!("invalid commit hex '{commit_hex}': {e}")))?;

        let commit = self
            .inner
            .find_commit(oid)
            .map_err(|e| Error::Git(format!("failed to find commit {commit_hex}: {e}")))?;

        let tree_id = commit
            .tree_id()
            .map_err(|e| Error::Git(format!("commit {commit_hex} has no tree: {e}")))?;

        self.inner
            .find_tree(tree_id)
            .map_err(|e| Error::Git(format!("failed to find tree for commit {commit_hex}: {e}")))
    }
}

/// NUL byte in the leading window marks a blob as binary.
fn is_binary(data: &[u8]) -> bool {
    data.iter().take(8000).any(|b| *b == 0)
}
