//! Worktree removal flow.
//!
//! Removing a worktree is a caller-driven sequence: check for uncommitted
//! changes, let the user confirm or cancel, then delete. The `force` flag is
//! fixed at confirmation time from the dirty check and passed unchanged into
//! the removal. Nothing here times out or retries.
//!
//! ```text
//! idle             -> checking_changes
//! checking_changes -> confirmed
//! checking_changes -> cancelled
//! checking_changes -> failed    (status check failed)
//! confirmed        -> deleting
//! deleting         -> done
//! deleting         -> failed
//! ```
//!
//! The dirty state is not re-checked right before deletion. If the worktree
//! becomes dirty after a clean check, the non-forced removal is refused by
//! git and the flow ends in `failed` with git's message.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::process::ExecutionError;
use crate::worktree::WorktreeManager;

/// Stage of a [`RemovalFlow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalState {
    Idle,
    CheckingChanges,
    Confirmed,
    Cancelled,
    Deleting,
    Done,
    Failed,
}

impl fmt::Display for RemovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CheckingChanges => "checking_changes",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Deleting => "deleting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl RemovalState {
    /// Whether `from -> to` is an edge of the removal graph.
    pub fn is_valid_transition(from: Self, to: Self) -> bool {
        matches!(
            (from, to),
            (Self::Idle, Self::CheckingChanges)
                | (Self::CheckingChanges, Self::Confirmed)
                | (Self::CheckingChanges, Self::Cancelled)
                | (Self::CheckingChanges, Self::Failed)
                | (Self::Confirmed, Self::Deleting)
                | (Self::Deleting, Self::Done)
                | (Self::Deleting, Self::Failed)
        )
    }

    /// No further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Done | Self::Failed)
    }
}

#[derive(Debug, Error)]
pub enum RemovalError {
    #[error("invalid removal transition: {from} -> {to}")]
    InvalidTransition { from: RemovalState, to: RemovalState },

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// One removal attempt for one worktree.
#[derive(Debug, Clone)]
pub struct RemovalFlow {
    repo_path: PathBuf,
    worktree_path: PathBuf,
    state: RemovalState,
    dirty: Option<bool>,
    force: Option<bool>,
    error: Option<String>,
}

impl RemovalFlow {
    pub fn new(repo_path: impl Into<PathBuf>, worktree_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            worktree_path: worktree_path.into(),
            state: RemovalState::Idle,
            dirty: None,
            force: None,
            error: None,
        }
    }

    pub fn state(&self) -> RemovalState {
        self.state
    }

    pub fn worktree_path(&self) -> &Path {
        &self.worktree_path
    }

    /// Result of the dirty check, once it has run.
    pub fn is_dirty(&self) -> Option<bool> {
        self.dirty
    }

    /// The `force` flag fixed at confirmation.
    pub fn force(&self) -> Option<bool> {
        self.force
    }

    /// Git's message when the flow ended in `failed`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Check the worktree for uncommitted changes. Returns whether it is dirty.
    pub async fn check(&mut self, manager: &WorktreeManager) -> Result<bool, RemovalError> {
        self.transition(RemovalState::CheckingChanges)?;
        match manager.has_uncommitted_changes(&self.worktree_path).await {
            Ok(dirty) => {
                self.dirty = Some(dirty);
                Ok(dirty)
            }
            Err(e) => {
                self.fail(&e);
                Err(e.into())
            }
        }
    }

    /// The user confirmed. Fixes `force` to the dirty result and returns it.
    pub fn confirm(&mut self) -> Result<bool, RemovalError> {
        self.transition(RemovalState::Confirmed)?;
        let force = self.dirty.unwrap_or(false);
        self.force = Some(force);
        Ok(force)
    }

    /// The user backed out; the worktree is left alone.
    pub fn cancel(&mut self) -> Result<(), RemovalError> {
        self.transition(RemovalState::Cancelled)
    }

    /// Remove the worktree with the confirmed `force` flag.
    ///
    /// On success the caller should re-list worktrees. On failure the flow
    /// keeps git's message verbatim in [`Self::error`].
    pub async fn execute(&mut self, manager: &WorktreeManager) -> Result<(), RemovalError> {
        self.transition(RemovalState::Deleting)?;
        let force = self.force.unwrap_or(false);
        match manager
            .remove_worktree(&self.repo_path, &self.worktree_path, force)
            .await
        {
            Ok(()) => {
                self.state = RemovalState::Done;
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e.into())
            }
        }
    }

    fn transition(&mut self, to: RemovalState) -> Result<(), RemovalError> {
        if !RemovalState::is_valid_transition(self.state, to) {
            return Err(RemovalError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(
            path = %self.worktree_path.display(),
            from = %self.state,
            to = %to,
            "removal transition"
        );
        self.state = to;
        Ok(())
    }

    fn fail(&mut self, error: &ExecutionError) {
        self.state = RemovalState::Failed;
        self.error = Some(error.message());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::process::testing::ScriptedRunner;

    fn flow() -> RemovalFlow {
        RemovalFlow::new("/repos/app", "/repos/app-x")
    }

    #[test]
    fn transition_graph() {
        use RemovalState::*;
        assert!(RemovalState::is_valid_transition(Idle, CheckingChanges));
        assert!(RemovalState::is_valid_transition(CheckingChanges, Cancelled));
        assert!(RemovalState::is_valid_transition(Deleting, Failed));
        assert!(!RemovalState::is_valid_transition(Idle, Deleting));
        assert!(!RemovalState::is_valid_transition(Cancelled, Deleting));
        assert!(!RemovalState::is_valid_transition(Done, Idle));
        assert!(Done.is_terminal() && Cancelled.is_terminal() && Failed.is_terminal());
        assert!(!Confirmed.is_terminal());
    }

    #[tokio::test]
    async fn dirty_worktree_is_removed_with_force() {
        let runner = Arc::new(ScriptedRunner::new().ok(" M README.md\n").ok("").ok(""));
        let manager = WorktreeManager::new(runner.clone());
        let mut flow = flow();

        assert!(flow.check(&manager).await.unwrap());
        assert_eq!(flow.confirm().unwrap(), true);
        flow.execute(&manager).await.unwrap();

        assert_eq!(flow.state(), RemovalState::Done);
        assert!(runner.calls()[1].contains(&"--force".to_string()));
    }

    #[tokio::test]
    async fn clean_worktree_is_removed_without_force() {
        let runner = Arc::new(ScriptedRunner::new().ok("").ok("").ok(""));
        let manager = WorktreeManager::new(runner.clone());
        let mut flow = flow();

        assert!(!flow.check(&manager).await.unwrap());
        assert_eq!(flow.confirm().unwrap(), false);
        flow.execute(&manager).await.unwrap();

        assert_eq!(flow.force(), Some(false));
        assert!(!runner.calls()[1].contains(&"--force".to_string()));
    }

    #[tokio::test]
    async fn cancelled_flow_cannot_delete() {
        let runner = Arc::new(ScriptedRunner::new().ok(""));
        let manager = WorktreeManager::new(runner.clone());
        let mut flow = flow();

        flow.check(&manager).await.unwrap();
        flow.cancel().unwrap();
        let err = flow.execute(&manager).await.unwrap_err();

        assert!(matches!(
            err,
            RemovalError::InvalidTransition {
                from: RemovalState::Cancelled,
                to: RemovalState::Deleting
            }
        ));
        assert_eq!(runner.calls().len(), 1, "only the status check ran");
    }

    #[tokio::test]
    async fn confirm_requires_check() {
        let mut flow = flow();
        assert!(matches!(
            flow.confirm(),
            Err(RemovalError::InvalidTransition { from: RemovalState::Idle, .. })
        ));
    }

    #[tokio::test]
    async fn failed_removal_keeps_git_message() {
        // Clean at check time, dirty by deletion time: git refuses.
        let runner = Arc::new(
            ScriptedRunner::new()
                .ok("")
                .fail(128, "fatal: '/repos/app-x' contains modified or untracked files, use --force to delete it\n")
                .ok(""),
        );
        let manager = WorktreeManager::new(runner);
        let mut flow = flow();

        flow.check(&manager).await.unwrap();
        flow.confirm().unwrap();
        assert!(flow.execute(&manager).await.is_err());

        assert_eq!(flow.state(), RemovalState::Failed);
        assert_eq!(
            flow.error(),
            Some("fatal: '/repos/app-x' contains modified or untracked files, use --force to delete it")
        );
    }

    #[tokio::test]
    async fn prune_failure_after_removal_still_finishes() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .ok("")
                .ok("")
                .fail(128, "fatal: Unable to create '/repos/app/.git/worktrees.lock'"),
        );
        let manager = WorktreeManager::new(runner);
        let mut flow = flow();

        flow.check(&manager).await.unwrap();
        flow.confirm().unwrap();
        flow.execute(&manager).await.unwrap();

        assert_eq!(flow.state(), RemovalState::Done);
        assert_eq!(flow.error(), None);
    }

    #[tokio::test]
    async fn failed_check_ends_flow() {
        let runner = Arc::new(ScriptedRunner::new().fail(128, "fatal: cannot change to '/repos/app-x'"));
        let manager = WorktreeManager::new(runner);
        let mut flow = flow();

        assert!(flow.check(&manager).await.is_err());
        assert_eq!(flow.state(), RemovalState::Failed);
        assert!(flow.confirm().is_err());
    }
}
