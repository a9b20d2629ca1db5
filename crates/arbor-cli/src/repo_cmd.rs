//! `arbor repo` commands: manage the repository registry.

use std::path::Path;

use anyhow::{Context, Result, bail};

use arbor_core::registry::RepositoryRegistry;

use crate::RepoCommands;
use crate::resolve::absolute;

pub fn run_repo_command(command: RepoCommands, registry_path: &Path) -> Result<()> {
    let mut registry = RepositoryRegistry::load(registry_path)?;

    match command {
        RepoCommands::Add { path } => {
            if !path.is_dir() {
                bail!("{} is not a directory", path.display());
            }
            let path = absolute(&path);
            match registry.add(&path) {
                Some(repo) => println!("Added {} ({})", repo.name, repo.id),
                None => {
                    println!("{} is already registered.", path.display());
                    return Ok(());
                }
            }
            registry.save()?;
        }
        RepoCommands::Remove { repo } => {
            let found = registry
                .find(&repo)
                .cloned()
                .with_context(|| format!("no registered repository matches {repo:?}"))?;
            registry.remove(found.id);
            registry.save()?;
            println!("Removed {} ({})", found.name, found.path.display());
        }
        RepoCommands::List => {
            if registry.repositories().is_empty() {
                println!("No repositories registered. Add one with `arbor repo add <path>`.");
                return Ok(());
            }
            for repo in registry.repositories() {
                println!("{}  {}  {}", repo.id, repo.name, repo.path.display());
            }
        }
    }

    Ok(())
}
