//! Git worktree lifecycle management.
//!
//! The manager discovers worktrees through `git worktree list --porcelain`,
//! creates new worktrees bound to new branches, checks for uncommitted
//! changes and removes worktrees. It keeps no state of its own: every call
//! shells out to git, and all state lives in the repository metadata on disk.
//!
//! No locks are taken. Concurrent mutating calls against one repository rely
//! on git's own lock files.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::process::{ExecutionError, ProcessRunner, SystemRunner};
use crate::remote;

/// Length of the abbreviated HEAD hash kept on each [`Worktree`].
pub const SHORT_HASH_LEN: usize = 7;

const HEADS_PREFIX: &str = "refs/heads/";

/// One checked-out working copy of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Worktree {
    /// Absolute path to the worktree directory. Unique per repository.
    pub path: PathBuf,
    /// Branch checked out in this worktree; `None` when HEAD is detached.
    pub branch: Option<String>,
    /// Abbreviated HEAD commit hash.
    pub head_commit: String,
    /// Bare/primary worktree, or checked out on `main`/`master`.
    pub is_main: bool,
    pub is_detached: bool,
    pub is_locked: bool,
    pub is_prunable: bool,
}

impl Worktree {
    /// The worktree's identifier, which is its path.
    pub fn id(&self) -> &Path {
        &self.path
    }

    /// Branch name, or the short hash for a detached HEAD.
    pub fn label(&self) -> &str {
        self.branch.as_deref().unwrap_or(&self.head_commit)
    }
}

/// Manages the worktrees of any repository it is pointed at.
#[derive(Debug, Clone)]
pub struct WorktreeManager {
    runner: Arc<dyn ProcessRunner>,
    git: String,
}

impl Default for WorktreeManager {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner::new()))
    }
}

impl WorktreeManager {
    /// Create a manager that invokes `git` through the given runner.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            git: "git".to_string(),
        }
    }

    /// Use a different version-control executable (e.g. an absolute path).
    pub fn with_git_binary(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    pub fn git_binary(&self) -> &str {
        &self.git
    }

    /// Destination path for a new worktree: a sibling of the repository
    /// named `<repo-dir-name>-<branch_name>`.
    pub fn worktree_path(repo_path: &Path, branch_name: &str) -> PathBuf {
        let repo_name = repo_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| "repo".into());
        let dir_name = format!("{repo_name}-{branch_name}");
        repo_path
            .parent()
            .map(|p| p.join(&dir_name))
            .unwrap_or_else(|| PathBuf::from(dir_name))
    }

    /// List all worktrees of the repository at `repo_path`, in git's order.
    pub async fn list_worktrees(&self, repo_path: &Path) -> Result<Vec<Worktree>, ExecutionError> {
        let output = self
            .git(repo_path, &["worktree", "list", "--porcelain"])
            .await?;
        Ok(parse_porcelain_output(&output))
    }

    /// Create a worktree on a new branch `branch_name`, branched from `base`
    /// or, when `base` is `None`, from whatever git resolves HEAD to.
    ///
    /// Returns the destination path. Success is decided by git's exit
    /// status alone; the path is not re-read afterwards.
    pub async fn create_worktree(
        &self,
        repo_path: &Path,
        branch_name: &str,
        base: Option<&str>,
    ) -> Result<PathBuf, ExecutionError> {
        let trimmed = branch_name.trim();
        if trimmed.is_empty() {
            return Err(ExecutionError::InvalidBranchName(branch_name.to_string()));
        }
        let branch_name = trimmed;

        // git resolves relative paths against `-C <repo>`, not our cwd.
        let repo_path = absolute(repo_path)?;
        let repo_path = repo_path.as_path();
        let destination = Self::worktree_path(repo_path, branch_name);
        let mut args: Vec<&OsStr> = vec![
            OsStr::new("worktree"),
            OsStr::new("add"),
            OsStr::new("-b"),
            OsStr::new(branch_name),
            destination.as_os_str(),
        ];
        if let Some(base) = base {
            args.push(OsStr::new(base));
        }

        self.git(repo_path, args.as_slice()).await?;

        tracing::info!(
            repo = %repo_path.display(),
            path = %destination.display(),
            branch = branch_name,
            base = base.unwrap_or("HEAD"),
            "created worktree"
        );
        Ok(destination)
    }

    /// Remove a worktree, then prune stale administrative entries.
    ///
    /// Without `force`, git refuses to remove a worktree with uncommitted
    /// changes; that refusal is returned as-is. The prune step runs even
    /// when the removal fails. A failed prune is only logged: the result
    /// reflects whether the worktree itself was removed.
    pub async fn remove_worktree(
        &self,
        repo_path: &Path,
        worktree_path: &Path,
        force: bool,
    ) -> Result<(), ExecutionError> {
        let repo_path = absolute(repo_path)?;
        let repo_path = repo_path.as_path();
        let worktree_path = absolute(worktree_path)?;
        let worktree_path = worktree_path.as_path();

        let mut args: Vec<&OsStr> = vec![OsStr::new("worktree"), OsStr::new("remove")];
        if force {
            args.push(OsStr::new("--force"));
        }
        args.push(worktree_path.as_os_str());

        let removed = self.git(repo_path, args.as_slice()).await;
        if let Err(prune_err) = self.prune(repo_path).await {
            tracing::warn!(
                repo = %repo_path.display(),
                error = %prune_err,
                removed = removed.is_ok(),
                "worktree prune failed"
            );
        }
        removed?;

        tracing::info!(
            repo = %repo_path.display(),
            path = %worktree_path.display(),
            force,
            "removed worktree"
        );
        Ok(())
    }

    /// Run `git worktree prune` to drop entries whose directories are gone.
    pub async fn prune(&self, repo_path: &Path) -> Result<(), ExecutionError> {
        self.git(repo_path, &["worktree", "prune"]).await?;
        Ok(())
    }

    /// Whether the worktree has staged, unstaged or untracked changes.
    ///
    /// This is a point-in-time answer; nothing stops another process from
    /// changing the worktree right after.
    pub async fn has_uncommitted_changes(&self, worktree_path: &Path) -> Result<bool, ExecutionError> {
        let output = self.git(worktree_path, &["status", "--porcelain"]).await?;
        Ok(!output.trim().is_empty())
    }

    /// Local branch names, in git's order. Entries such as
    /// `(HEAD detached at 611fcb1)` are not branches and are left out.
    pub async fn list_branches(&self, repo_path: &Path) -> Result<Vec<String>, ExecutionError> {
        let output = self
            .git(repo_path, &["branch", "--format=%(refname:short)"])
            .await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !is_pseudo_branch(line))
            .map(str::to_string)
            .collect())
    }

    /// URL configured for `remote` (e.g. `origin`).
    pub async fn remote_url(&self, repo_path: &Path, remote: &str) -> Result<String, ExecutionError> {
        let output = self
            .git(repo_path, &["remote", "get-url", remote])
            .await?;
        Ok(output.trim().to_string())
    }

    /// Web page comparing `branch` against the default branch on the hosting
    /// service of `origin`, if that remote is a recognised form.
    pub async fn compare_url(
        &self,
        repo_path: &Path,
        branch: &str,
    ) -> Result<Option<String>, ExecutionError> {
        let url = self.remote_url(repo_path, "origin").await?;
        Ok(remote::derive_compare_url(&url).map(|web| remote::branch_compare_url(&web, branch)))
    }

    /// Run git against `dir` (passed as `-C <dir>`).
    async fn git<S: AsRef<OsStr>>(&self, dir: &Path, args: &[S]) -> Result<String, ExecutionError> {
        let mut full: Vec<OsString> = Vec::with_capacity(args.len() + 2);
        full.push(OsString::from("-C"));
        full.push(dir.as_os_str().to_os_string());
        full.extend(args.iter().map(|a| a.as_ref().to_os_string()));
        self.runner.run(&self.git, &full).await
    }
}

/// Pick the branch a new worktree should start from when the user has not
/// chosen one: `main`, then `master`, then the first real branch listed.
pub fn default_base_branch(branches: &[String]) -> Option<&str> {
    ["main", "master"]
        .iter()
        .find_map(|name| branches.iter().find(|b| b == name))
        .or_else(|| branches.iter().find(|b| !is_pseudo_branch(b)))
        .map(String::as_str)
}

/// `git branch` prints detached HEADs and in-progress rebases in parentheses.
fn is_pseudo_branch(name: &str) -> bool {
    name.starts_with('(')
}

fn absolute(path: &Path) -> Result<PathBuf, ExecutionError> {
    std::path::absolute(path).map_err(|source| ExecutionError::InvalidPath {
        path: path.to_path_buf(),
        source,
    })
}

/// Stable sort putting main worktrees first, otherwise keeping git's order.
pub fn sort_main_first(worktrees: &mut [Worktree]) {
    worktrees.sort_by_key(|wt| !wt.is_main);
}

/// Accumulates the lines of one porcelain block.
#[derive(Default)]
struct Block {
    path: Option<PathBuf>,
    head: Option<String>,
    branch_ref: Option<String>,
    bare: bool,
    detached: bool,
    locked: bool,
    prunable: bool,
    seen_lines: bool,
}

impl Block {
    fn apply(&mut self, line: &str) {
        self.seen_lines = true;
        let (key, value) = match line.split_once(' ') {
            Some((key, value)) => (key, Some(value)),
            None => (line, None),
        };
        match (key, value) {
            ("worktree", Some(path)) => self.path = Some(PathBuf::from(path)),
            ("HEAD", Some(hash)) => self.head = Some(hash.chars().take(SHORT_HASH_LEN).collect()),
            ("branch", Some(reference)) => self.branch_ref = Some(reference.to_string()),
            ("bare", None) => self.bare = true,
            ("detached", None) => self.detached = true,
            ("locked", _) => self.locked = true,
            ("prunable", _) => self.prunable = true,
            _ => {}
        }
    }

    fn finish(self) -> Option<Worktree> {
        let (Some(path), Some(head_commit)) = (self.path, self.head) else {
            if self.seen_lines {
                tracing::warn!("dropping worktree record without path or HEAD");
            }
            return None;
        };

        let is_main = self.bare
            || matches!(
                self.branch_ref.as_deref(),
                Some("refs/heads/main" | "refs/heads/master")
            );
        let branch = self.branch_ref.map(|reference| {
            reference
                .strip_prefix(HEADS_PREFIX)
                .map(str::to_string)
                .unwrap_or(reference)
        });

        Some(Worktree {
            path,
            branch,
            head_commit,
            is_main,
            is_detached: self.detached,
            is_locked: self.locked,
            is_prunable: self.prunable,
        })
    }
}

/// Parse the output of `git worktree list --porcelain`.
///
/// Blocks are separated by blank lines:
///
/// ```text
/// worktree <path>
/// HEAD <sha>
/// branch refs/heads/<name>
/// ```
///
/// A bare repository shows `bare` instead of `HEAD`/`branch`, detached
/// worktrees show `detached`. Blocks without both `worktree` and `HEAD`
/// are dropped.
pub fn parse_porcelain_output(output: &str) -> Vec<Worktree> {
    let mut worktrees = Vec::new();
    let mut block = Block::default();

    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            worktrees.extend(std::mem::take(&mut block).finish());
            continue;
        }
        block.apply(line);
    }
    // Output may not end with a blank line.
    worktrees.extend(block.finish());

    worktrees
}
