mod config;
mod mcp_cmd;
mod repo_cmd;
mod resolve;
#[cfg(test)]
mod test_util;
mod worktree_cmds;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use arbor_core::terminal::TerminalApp;

use config::{ArborConfig, CliOverrides};
use worktree_cmds::BaseChoice;

#[derive(Parser)]
#[command(name = "arbor", about = "Manage git worktrees across registered repositories")]
struct Cli {
    /// Git executable (overrides ARBOR_GIT env var)
    #[arg(long, global = true)]
    git: Option<String>,

    /// Per-invocation git timeout in seconds, 0 to disable (overrides ARBOR_GIT_TIMEOUT)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write an arbor config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Repository registry management
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
    /// List worktrees of one repository, or of every registered repository
    List {
        /// Registry id, name, or path (omit to list all registered repositories)
        repo: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List local branches of a repository
    Branches {
        /// Registry id, name, or path
        repo: String,
    },
    /// Create a worktree on a new branch next to the repository
    Create {
        /// Registry id, name, or path
        repo: String,
        /// Name of the branch to create
        branch: String,
        /// Branch to start from (defaults to main, then master)
        #[arg(long, conflicts_with = "from_head")]
        base: Option<String>,
        /// Start from the repository's current HEAD
        #[arg(long)]
        from_head: bool,
        /// Open the new worktree in a terminal afterwards
        #[arg(long)]
        open: bool,
    },
    /// Remove a worktree, asking first
    Remove {
        /// Registry id, name, or path of the owning repository
        repo: String,
        /// Path of the worktree to remove
        worktree: PathBuf,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Report whether a worktree has uncommitted changes
    Status {
        /// Path of the worktree
        worktree: PathBuf,
    },
    /// Print the web compare link for a branch
    Compare {
        /// Registry id, name, or path
        repo: String,
        /// Branch to compare
        branch: String,
    },
    /// Open a directory in a terminal running the agent CLI
    Open {
        /// Directory to open
        path: PathBuf,
        /// Terminal to use: ghostty, terminal, iterm
        #[arg(long)]
        terminal: Option<TerminalApp>,
    },
    /// Agent MCP server settings
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },
}

#[derive(Subcommand)]
pub enum RepoCommands {
    /// Register a repository
    Add {
        /// Path to the repository
        path: PathBuf,
    },
    /// Unregister a repository (nothing on disk is touched)
    Remove {
        /// Registry id, name, or path
        repo: String,
    },
    /// List registered repositories
    List,
}

#[derive(Subcommand)]
pub enum McpCommands {
    /// List configured MCP servers
    List,
    /// Enable an MCP server
    Enable {
        /// Server id
        id: String,
    },
    /// Disable an MCP server
    Disable {
        /// Server id
        id: String,
    },
}

/// Execute the `arbor init` command: write config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile::starter();
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    if let Some(ref app) = cfg.terminal.app {
        println!("  terminal.app = {app}");
    }
    println!();
    println!("Next: run `arbor repo add <path>` to register a repository.");

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = CliOverrides {
        git: cli.git,
        timeout_secs: cli.timeout,
        terminal: match cli.command {
            Commands::Open { terminal, .. } => terminal,
            _ => None,
        },
    };

    match cli.command {
        Commands::Init { force } => cmd_init(force),
        command => dispatch(command, &ArborConfig::resolve(&overrides)?).await,
    }
}

async fn dispatch(command: Commands, config: &ArborConfig) -> anyhow::Result<()> {
    match command {
        Commands::Init { force } => {
            cmd_init(force)?;
        }
        Commands::Repo { command } => {
            repo_cmd::run_repo_command(command, &config.registry_path)?;
        }
        Commands::List { repo, json } => {
            worktree_cmds::run_list(config, repo.as_deref(), json).await?;
        }
        Commands::Branches { repo } => {
            worktree_cmds::run_branches(config, &repo).await?;
        }
        Commands::Create {
            repo,
            branch,
            base,
            from_head,
            open,
        } => {
            let base = match (base, from_head) {
                (Some(name), _) => BaseChoice::Explicit(name),
                (None, true) => BaseChoice::Head,
                (None, false) => BaseChoice::Default,
            };
            worktree_cmds::run_create(config, &repo, &branch, base, open).await?;
        }
        Commands::Remove {
            repo,
            worktree,
            yes,
        } => {
            worktree_cmds::run_remove(config, &repo, &worktree, yes).await?;
        }
        Commands::Status { worktree } => {
            worktree_cmds::run_status(config, &worktree).await?;
        }
        Commands::Compare { repo, branch } => {
            worktree_cmds::run_compare(config, &repo, &branch).await?;
        }
        Commands::Open { path, .. } => {
            worktree_cmds::run_open(config, &path)?;
        }
        Commands::Mcp { command } => {
            mcp_cmd::run_mcp_command(command, &config.mcp_settings)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
