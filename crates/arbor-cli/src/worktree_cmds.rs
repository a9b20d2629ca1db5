//! Worktree commands: list, branches, create, remove, status, compare, open.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use arbor_core::registry::RepositoryRegistry;
use arbor_core::removal::RemovalFlow;
use arbor_core::terminal::TerminalApp;
use arbor_core::worktree::{Worktree, WorktreeManager, default_base_branch, sort_main_first};

use crate::config::ArborConfig;
use crate::resolve::{absolute, resolve_repo};

/// Listing result for one repository.
#[derive(Debug, Serialize)]
struct RepoListing {
    name: String,
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    worktrees: Vec<Worktree>,
}

/// How `create` picks the branch to start from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseChoice {
    /// Use this branch.
    Explicit(String),
    /// Let git branch from the current HEAD.
    Head,
    /// `main`, else `master`, else the first local branch.
    Default,
}

/// Run `arbor list`: worktrees of one repository, or of every registered
/// repository fetched concurrently.
pub async fn run_list(config: &ArborConfig, repo: Option<&str>, json: bool) -> Result<()> {
    let registry = RepositoryRegistry::load(&config.registry_path)?;
    let manager = config.worktree_manager();

    let targets: Vec<(String, PathBuf)> = match repo {
        Some(input) => {
            let path = resolve_repo(&registry, input)?;
            vec![(display_name(&path), path)]
        }
        None => registry
            .repositories()
            .iter()
            .map(|r| (r.name.clone(), r.path.clone()))
            .collect(),
    };

    if targets.is_empty() && !json {
        println!("No repositories registered. Add one with `arbor repo add <path>`.");
        return Ok(());
    }

    tracing::debug!(repos = targets.len(), "listing worktrees");
    let listings = futures::future::join_all(
        targets
            .into_iter()
            .map(|(name, path)| list_one(&manager, name, path)),
    )
    .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    for (i, listing) in listings.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}  ({})", listing.name, listing.path.display());
        if let Some(ref error) = listing.error {
            println!("  ! {error}");
            continue;
        }
        if listing.worktrees.is_empty() {
            println!("  No worktrees");
            continue;
        }
        let width = listing
            .worktrees
            .iter()
            .map(|wt| wt.label().len())
            .max()
            .unwrap_or(0);
        for wt in &listing.worktrees {
            let marker = if wt.is_main { '*' } else { ' ' };
            let mut flags = Vec::new();
            if wt.is_detached {
                flags.push("detached");
            }
            if wt.is_locked {
                flags.push("locked");
            }
            if wt.is_prunable {
                flags.push("prunable");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!("  [{}]", flags.join(", "))
            };
            println!(
                "  {marker} {:<width$}  {}  {}{flags}",
                wt.label(),
                wt.head_commit,
                wt.path.display(),
            );
        }
    }

    Ok(())
}

async fn list_one(manager: &WorktreeManager, name: String, path: PathBuf) -> RepoListing {
    if !path.exists() {
        return RepoListing {
            name,
            path,
            error: Some("Repository not found on disk".to_string()),
            worktrees: Vec::new(),
        };
    }
    match manager.list_worktrees(&path).await {
        Ok(mut worktrees) => {
            sort_main_first(&mut worktrees);
            RepoListing {
                name,
                path,
                error: None,
                worktrees,
            }
        }
        Err(e) => RepoListing {
            name,
            path,
            error: Some(e.message()),
            worktrees: Vec::new(),
        },
    }
}

/// Run `arbor branches <repo>`.
pub async fn run_branches(config: &ArborConfig, repo: &str) -> Result<()> {
    let registry = RepositoryRegistry::load(&config.registry_path)?;
    let repo_path = resolve_repo(&registry, repo)?;

    for branch in config.worktree_manager().list_branches(&repo_path).await? {
        println!("{branch}");
    }
    Ok(())
}

/// Run `arbor create <repo> <branch>`.
pub async fn run_create(
    config: &ArborConfig,
    repo: &str,
    branch: &str,
    base: BaseChoice,
    open: bool,
) -> Result<()> {
    let registry = RepositoryRegistry::load(&config.registry_path)?;
    let repo_path = resolve_repo(&registry, repo)?;
    let manager = config.worktree_manager();

    let base = match base {
        BaseChoice::Explicit(name) => Some(name),
        BaseChoice::Head => None,
        BaseChoice::Default => {
            let branches = manager.list_branches(&repo_path).await?;
            default_base_branch(&branches).map(str::to_string)
        }
    };

    let path = manager
        .create_worktree(&repo_path, branch, base.as_deref())
        .await?;

    println!("Created worktree {}", path.display());
    println!("  branch: {} (from {})", branch.trim(), base.as_deref().unwrap_or("HEAD"));

    if open {
        open_terminal(config, &path)?;
    }
    Ok(())
}

/// Run `arbor remove <repo> <worktree>`: check, confirm, delete, re-list.
pub async fn run_remove(config: &ArborConfig, repo: &str, worktree: &Path, yes: bool) -> Result<()> {
    let registry = RepositoryRegistry::load(&config.registry_path)?;
    let repo_path = resolve_repo(&registry, repo)?;
    let worktree = absolute(worktree);
    let manager = config.worktree_manager();

    let mut flow = RemovalFlow::new(&repo_path, &worktree);
    let dirty = flow.check(&manager).await?;

    let prompt = if dirty {
        format!(
            "{} has uncommitted changes that will be lost. Remove anyway? [y/N] ",
            worktree.display()
        )
    } else {
        format!("Remove worktree {}? [y/N] ", worktree.display())
    };

    if !yes && !confirm(&prompt)? {
        flow.cancel()?;
        println!("Cancelled.");
        return Ok(());
    }

    flow.confirm()?;
    if let Err(e) = flow.execute(&manager).await {
        bail!(
            "failed to remove {}: {}",
            worktree.display(),
            flow.error().map(str::to_string).unwrap_or_else(|| e.to_string())
        );
    }
    println!("Removed {}", worktree.display());

    let remaining = manager.list_worktrees(&repo_path).await?;
    println!("{} worktree(s) remain in {}", remaining.len(), repo_path.display());
    Ok(())
}

/// Run `arbor status <worktree>`.
pub async fn run_status(config: &ArborConfig, worktree: &Path) -> Result<()> {
    let dirty = config
        .worktree_manager()
        .has_uncommitted_changes(worktree)
        .await?;
    println!("{}", if dirty { "dirty" } else { "clean" });
    Ok(())
}

/// Run `arbor compare <repo> <branch>`.
pub async fn run_compare(config: &ArborConfig, repo: &str, branch: &str) -> Result<()> {
    let registry = RepositoryRegistry::load(&config.registry_path)?;
    let repo_path = resolve_repo(&registry, repo)?;

    match config.worktree_manager().compare_url(&repo_path, branch).await? {
        Some(url) => println!("{url}"),
        None => println!("No compare link available for this remote."),
    }
    Ok(())
}

/// Run `arbor open <path>`.
pub fn run_open(config: &ArborConfig, path: &Path) -> Result<()> {
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }
    open_terminal(config, &absolute(path))
}

fn open_terminal(config: &ArborConfig, path: &Path) -> Result<()> {
    let app = TerminalApp::resolve(config.terminal);
    app.launch_spec(path, &config.agent_cli)
        .launch()
        .with_context(|| format!("failed to open {} in {}", path.display(), app.app_name()))?;
    println!("Opened {} in {}", path.display(), app.app_name());
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
