//! Shared test utilities for arbor integration tests.
//!
//! Provides throwaway git repositories with an initial commit. The
//! repository lives one level below the temporary directory so that sibling
//! worktrees (`<repo>-<branch>`) are created inside it and cleaned up with it.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// A temporary git repository. Dropping it removes the repository and any
/// sibling worktrees created next to it.
pub struct TempRepo {
    _dir: TempDir,
    root: PathBuf,
    path: PathBuf,
}

impl TempRepo {
    /// Create a repository named `app` on branch `main` with one commit.
    pub fn new() -> Self {
        Self::named("app")
    }

    /// Create a repository with the given directory name.
    pub fn named(name: &str) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        // Canonicalize so paths compare equal to what git prints back
        // (macOS puts temp dirs behind a /private symlink).
        let root = dir
            .path()
            .canonicalize()
            .expect("failed to canonicalize temp dir");
        let path = root.join(name);
        std::fs::create_dir_all(&path).expect("failed to create repo dir");

        git(&path, &["init", "-b", "main"]);
        git(&path, &["config", "user.email", "test@arbor.dev"]);
        git(&path, &["config", "user.name", "Arbor Test"]);
        std::fs::write(path.join("README.md"), "# Test repo\n").expect("failed to write README");
        git(&path, &["add", "."]);
        git(&path, &["commit", "-m", "Initial commit"]);

        Self {
            _dir: dir,
            root,
            path,
        }
    }

    /// Path of the repository's main worktree.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The temporary directory holding the repository and its siblings.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a local branch at HEAD without checking it out.
    pub fn branch(&self, name: &str) {
        git(&self.path, &["branch", name]);
    }

    /// Run git in the repository and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> String {
        git(&self.path, args)
    }
}

impl Default for TempRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Run git in `dir`, panicking with stderr on failure. Returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("git {} failed to start: {e}", args.join(" ")));
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
