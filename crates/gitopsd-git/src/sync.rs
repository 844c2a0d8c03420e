//! Repository sync engine.
//!
//! `git2` is synchronous, so every call here wraps the blocking work in
//! `tokio::task::spawn_blocking`. Working-tree isolation — concurrent
//! operations against the same tree are serialized by a per-deployment
//! mutex — is the caller's responsibility: `gitopsd-controller` holds one
//! `tokio::sync::Mutex<WorkingTree>` per deployment and never shares a
//! `WorkingTree` across concurrent calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use git2::{FetchOptions, IndexAddOption, Repository, Signature};
use tempfile::TempDir;

use gitopsd_core::credential::Credentials;

use crate::backoff;
use crate::credentials::callbacks_for;
use crate::error::{GitError, GitResult};

/// Which ref a deployment or environment tracks.
#[derive(Debug, Clone)]
pub enum GitRef {
    Branch(String),
    Tag(String),
}

impl GitRef {
    fn refspec(&self) -> String {
        match self {
            GitRef::Branch(name) => format!("refs/heads/{name}"),
            GitRef::Tag(name) => format!("refs/tags/{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { attempts: 3, base: Duration::from_millis(500), cap: Duration::from_secs(8) }
    }
}

/// A locally-materialized checkout of a repository at a specific revision.
/// Deleted on drop (via the owned `TempDir`) and explicitly on `cleanup()`
/// for unrecoverable errors.
pub struct WorkingTree {
    _tempdir: TempDir,
    path: PathBuf,
}

impl WorkingTree {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the working tree immediately rather than waiting for drop.
    pub fn cleanup(self) {
        drop(self);
    }
}

/// Clone a repository at `git_ref` into a fresh working tree. Shallow (depth
/// 1) since only the current revision's content is ever read.
pub async fn clone(
    url: &str,
    git_ref: &GitRef,
    credentials: Option<Credentials>,
    retry: RetryConfig,
) -> GitResult<WorkingTree> {
    let url = url.to_string();
    let git_ref = git_ref.clone();
    backoff::retry(retry.attempts, retry.base, retry.cap, move || {
        let url = url.clone();
        let git_ref = git_ref.clone();
        let credentials = credentials.clone();
        async move {
            tokio::task::spawn_blocking(move || clone_blocking(&url, &git_ref, credentials.as_ref()))
                .await
                .map_err(|e| GitError::Transient(format!("join error: {e}")))?
        }
    })
    .await
}

fn clone_blocking(url: &str, git_ref: &GitRef, credentials: Option<&Credentials>) -> GitResult<WorkingTree> {
    let tempdir = TempDir::new()?;
    let mut fetch_opts = FetchOptions::new();
    fetch_opts.depth(1);
    fetch_opts.remote_callbacks(callbacks_for(credentials));

    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_opts);
    if let GitRef::Branch(name) = git_ref {
        builder.branch(name);
    }

    let repo = builder.clone(url, tempdir.path()).map_err(GitError::classify)?;

    if let GitRef::Tag(name) = git_ref {
        checkout_ref(&repo, &format!("refs/tags/{name}"))?;
    }

    let path = tempdir.path().to_path_buf();
    Ok(WorkingTree { _tempdir: tempdir, path })
}

/// Fetch `git_ref` and update the working tree to it, reporting the resolved
/// commit hash. If unchanged from the last-synced hash, callers short-circuit
/// downstream work.
pub async fn checkout(tree: &WorkingTree, git_ref: &GitRef, credentials: Option<Credentials>, retry: RetryConfig) -> GitResult<String> {
    let path = tree.path.clone();
    let git_ref = git_ref.clone();
    backoff::retry(retry.attempts, retry.base, retry.cap, move || {
        let path = path.clone();
        let git_ref = git_ref.clone();
        let credentials = credentials.clone();
        async move {
            tokio::task::spawn_blocking(move || checkout_blocking(&path, &git_ref, credentials.as_ref()))
                .await
                .map_err(|e| GitError::Transient(format!("join error: {e}")))?
        }
    })
    .await
}

fn checkout_blocking(path: &Path, git_ref: &GitRef, credentials: Option<&Credentials>) -> GitResult<String> {
    let repo = Repository::open(path)?;
    {
        let mut remote = repo.find_remote("origin")?;
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.depth(1);
        fetch_opts.remote_callbacks(callbacks_for(credentials));
        let refspec = git_ref.refspec();
        remote
            .fetch(&[&refspec], Some(&mut fetch_opts), None)
            .map_err(GitError::classify)?;
    }
    let fetch_head_refspec = match git_ref {
        GitRef::Branch(_) => "FETCH_HEAD".to_string(),
        GitRef::Tag(name) => format!("refs/tags/{name}"),
    };
    checkout_ref(&repo, &fetch_head_refspec)?;
    current_revision_blocking(path)
}

fn checkout_ref(repo: &Repository, refspec: &str) -> GitResult<()> {
    let object = repo.revparse_single(refspec)?;
    repo.checkout_tree(&object, Some(git2::build::CheckoutBuilder::new().force()))?;
    if let Ok(commit) = object.peel_to_commit() {
        repo.set_head_detached(commit.id())?;
    }
    Ok(())
}

/// The commit hash the working tree currently points at.
pub async fn current_revision(tree: &WorkingTree) -> GitResult<String> {
    let path = tree.path.clone();
    tokio::task::spawn_blocking(move || current_revision_blocking(&path))
        .await
        .map_err(|e| GitError::Transient(format!("join error: {e}")))?
}

fn current_revision_blocking(path: &Path) -> GitResult<String> {
    let repo = Repository::open(path)?;
    let head = repo.head()?.peel_to_commit()?;
    Ok(head.id().to_string())
}

/// Every file under `subdir` (repository-relative), read into memory keyed by
/// its path relative to `subdir`.
pub async fn files_at(tree: &WorkingTree, subdir: &str) -> GitResult<HashMap<String, Vec<u8>>> {
    let root = tree.path.join(subdir);
    tokio::task::spawn_blocking(move || read_dir_recursive(&root, &root))
        .await
        .map_err(|e| GitError::Transient(format!("join error: {e}")))?
}

fn read_dir_recursive(root: &Path, base: &Path) -> GitResult<HashMap<String, Vec<u8>>> {
    let mut files = HashMap::new();
    if !root.exists() {
        return Ok(files);
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.file_name().map(|n| n == ".git").unwrap_or(false) {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(base).unwrap_or(&path).to_string_lossy().replace('\\', "/");
                files.insert(rel, std::fs::read(&path)?);
            }
        }
    }
    Ok(files)
}

/// Write `files` (relative paths) under `base_path` (repository-relative),
/// creating parent directories and overwriting existing files.
pub async fn write_files(tree: &WorkingTree, base_path: &str, files: HashMap<String, Vec<u8>>) -> GitResult<()> {
    let root = tree.path.join(base_path);
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&root)?;
        for (rel_path, bytes) in files {
            let dest = root.join(&rel_path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, bytes)?;
        }
        Ok::<_, GitError>(())
    })
    .await
    .map_err(|e| GitError::Transient(format!("join error: {e}")))?
}

/// Stage every pending change, commit with the caller-supplied message and
/// author identity, and fast-forward push the current branch. Conflicts on
/// push surface as `GitError::Conflict`; the caller (promotion manager) is
/// expected to refetch and retry once before surfacing failure.
pub async fn commit_and_push(
    tree: &WorkingTree,
    credentials: Option<Credentials>,
    message: &str,
    author_name: &str,
    author_email: &str,
    retry: RetryConfig,
) -> GitResult<String> {
    let path = tree.path.clone();
    let message = message.to_string();
    let author_name = author_name.to_string();
    let author_email = author_email.to_string();

    // Commit once (not retried — it's local and has no transient failure mode).
    tokio::task::spawn_blocking({
        let path = path.clone();
        let message = message.clone();
        let author_name = author_name.clone();
        let author_email = author_email.clone();
        move || commit_blocking(&path, &message, &author_name, &author_email)
    })
    .await
    .map_err(|e| GitError::Transient(format!("join error: {e}")))??;

    backoff::retry(retry.attempts, retry.base, retry.cap, move || {
        let path = path.clone();
        let credentials = credentials.clone();
        async move {
            tokio::task::spawn_blocking(move || push_blocking(&path, credentials.as_ref()))
                .await
                .map_err(|e| GitError::Transient(format!("join error: {e}")))?
        }
    })
    .await
}

/// Returns `Ok(None)` if there is nothing to commit (working tree unchanged).
fn commit_blocking(path: &Path, message: &str, author_name: &str, author_email: &str) -> GitResult<()> {
    let repo = Repository::open(path)?;
    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.write()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;

    let parent = repo.head()?.peel_to_commit()?;
    if tree.id() == parent.tree_id() {
        return Ok(());
    }

    let signature = Signature::now(author_name, author_email)?;
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &[&parent])?;
    Ok(())
}

fn push_blocking(path: &Path, credentials: Option<&Credentials>) -> GitResult<String> {
    let repo = Repository::open(path)?;
    let head = repo.head()?;
    let branch_name = head.shorthand().unwrap_or("HEAD").to_string();
    let refspec = format!("refs/heads/{branch_name}:refs/heads/{branch_name}");

    let mut remote = repo.find_remote("origin")?;
    let mut push_opts = git2::PushOptions::new();
    push_opts.remote_callbacks(callbacks_for(credentials));

    remote.push(&[&refspec], Some(&mut push_opts)).map_err(|e| {
        if is_non_fast_forward(&e) {
            GitError::Conflict(e.message().to_string())
        } else {
            GitError::classify(e)
        }
    })?;

    current_revision_blocking(path)
}

fn is_non_fast_forward(err: &git2::Error) -> bool {
    err.code() == git2::ErrorCode::NotFastForward
        || err.message().to_lowercase().contains("non-fast-forward")
        || err.message().to_lowercase().contains("fetch first")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_tree() -> WorkingTree {
        let tempdir = TempDir::new().unwrap();
        let path = tempdir.path().to_path_buf();
        WorkingTree { _tempdir: tempdir, path }
    }

    #[tokio::test]
    async fn write_then_read_round_trips_file_bytes() {
        let tree = fixture_tree();
        let mut files = HashMap::new();
        files.insert("deployment.yaml".to_string(), b"kind: Deployment\n".to_vec());
        files.insert("nested/service.yaml".to_string(), b"kind: Service\n".to_vec());

        write_files(&tree, "envs/dev", files.clone()).await.unwrap();
        let read_back = files_at(&tree, "envs/dev").await.unwrap();

        assert_eq!(read_back, files);
    }

    #[tokio::test]
    async fn files_at_missing_subdir_returns_empty_map() {
        let tree = fixture_tree();
        let result = files_at(&tree, "does/not/exist").await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn write_files_overwrites_existing_file() {
        let tree = fixture_tree();
        let mut first = HashMap::new();
        first.insert("a.yaml".to_string(), b"v1".to_vec());
        write_files(&tree, "env", first).await.unwrap();

        let mut second = HashMap::new();
        second.insert("a.yaml".to_string(), b"v2".to_vec());
        write_files(&tree, "env", second).await.unwrap();

        let read_back = files_at(&tree, "env").await.unwrap();
        assert_eq!(read_back.get("a.yaml").unwrap(), b"v2");
    }
}
