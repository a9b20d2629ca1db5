//! Configuration file management for arbor.
//!
//! Provides a TOML-based config file at `~/.config/arbor/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use arbor_core::process::SystemRunner;
use arbor_core::terminal::{TerminalApp, expand_tilde};
use arbor_core::worktree::WorktreeManager;

pub const DEFAULT_GIT: &str = "git";
pub const DEFAULT_AGENT_CLI: &str = "~/.local/bin/claude";
pub const DEFAULT_MCP_SETTINGS: &str = "~/.claude/settings.json";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub git: GitSection,
    pub terminal: TerminalSection,
    pub mcp: McpSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSection {
    /// Version-control executable.
    pub binary: Option<String>,
    /// Kill git invocations that run longer than this.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSection {
    pub app: Option<TerminalApp>,
    /// Command started in the new terminal, `~` allowed.
    pub agent_cli: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSection {
    pub settings_path: Option<String>,
}

impl ConfigFile {
    /// The file written by `arbor init`.
    pub fn starter() -> Self {
        Self {
            git: GitSection {
                binary: Some(DEFAULT_GIT.to_string()),
                timeout_secs: Some(30),
            },
            terminal: TerminalSection {
                app: Some(TerminalApp::resolve(None)),
                agent_cli: Some(DEFAULT_AGENT_CLI.to_string()),
            },
            mcp: McpSection {
                settings_path: Some(DEFAULT_MCP_SETTINGS.to_string()),
            },
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the arbor config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/arbor` or `~/.config/arbor`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("arbor");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("arbor")
}

/// Return the path to the arbor config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Return the path to the repository registry.
pub fn registry_path() -> PathBuf {
    config_dir().join("repos.json")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub git: Option<String>,
    pub timeout_secs: Option<u64>,
    pub terminal: Option<TerminalApp>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct ArborConfig {
    pub git_binary: String,
    pub git_timeout: Option<Duration>,
    /// Preferred terminal; `None` means pick whatever is installed.
    pub terminal: Option<TerminalApp>,
    pub agent_cli: String,
    pub mcp_settings: PathBuf,
    pub registry_path: PathBuf,
}

impl ArborConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - git binary: `--git` > `ARBOR_GIT` > `git.binary` > `git`
    /// - timeout: `--timeout` > `ARBOR_GIT_TIMEOUT` > `git.timeout_secs` > none
    /// - terminal: `--terminal` > `ARBOR_TERMINAL` > `terminal.app` > installed default
    /// - MCP settings: `ARBOR_MCP_SETTINGS` > `mcp.settings_path` > `~/.claude/settings.json`
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file_config = if config_path().exists() {
            load_config()?
        } else {
            ConfigFile::default()
        };

        let git_binary = cli
            .git
            .clone()
            .or_else(|| env_var("ARBOR_GIT"))
            .or(file_config.git.binary)
            .unwrap_or_else(|| DEFAULT_GIT.to_string());

        let timeout_secs = match (cli.timeout_secs, env_var("ARBOR_GIT_TIMEOUT")) {
            (Some(secs), _) => Some(secs),
            (None, Some(raw)) => Some(
                raw.parse::<u64>()
                    .with_context(|| format!("ARBOR_GIT_TIMEOUT is not a number of seconds: {raw:?}"))?,
            ),
            (None, None) => file_config.git.timeout_secs,
        };
        let git_timeout = timeout_secs.filter(|s| *s > 0).map(Duration::from_secs);

        let terminal = match (cli.terminal, env_var("ARBOR_TERMINAL")) {
            (Some(app), _) => Some(app),
            (None, Some(raw)) => Some(raw.parse().context("invalid ARBOR_TERMINAL")?),
            (None, None) => file_config.terminal.app,
        };

        let agent_cli = file_config
            .terminal
            .agent_cli
            .unwrap_or_else(|| DEFAULT_AGENT_CLI.to_string());

        let mcp_settings = env_var("ARBOR_MCP_SETTINGS")
            .or(file_config.mcp.settings_path)
            .unwrap_or_else(|| DEFAULT_MCP_SETTINGS.to_string());

        Ok(Self {
            git_binary,
            git_timeout,
            terminal,
            agent_cli,
            mcp_settings: expand_tilde(&mcp_settings),
            registry_path: registry_path(),
        })
    }

    /// A worktree manager using the configured git binary and timeout.
    pub fn worktree_manager(&self) -> WorktreeManager {
        let mut runner = SystemRunner::new();
        if let Some(timeout) = self.git_timeout {
            runner = runner.with_timeout(timeout);
        }
        WorktreeManager::new(Arc::new(runner)).with_git_binary(&self.git_binary)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    /// Point the config directory at an empty temp dir for the test's duration.
    fn isolated_config() -> tempfile::TempDir {
        let tmp = tempfile::TempDir::new().unwrap();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
        for var in ["ARBOR_GIT", "ARBOR_GIT_TIMEOUT", "ARBOR_TERMINAL", "ARBOR_MCP_SETTINGS"] {
            unsafe { std::env::remove_var(var) };
        }
        tmp
    }

    #[test]
    fn defaults_when_nothing_set() {
        let _lock = lock_env();
        let tmp = isolated_config();

        let config = ArborConfig::resolve(&CliOverrides::default()).unwrap();
        assert_eq!(config.git_binary, "git");
        assert_eq!(config.git_timeout, None);
        assert_eq!(config.terminal, None);
        assert_eq!(config.agent_cli, DEFAULT_AGENT_CLI);
        assert!(config.mcp_settings.ends_with(".claude/settings.json"));
        assert_eq!(config.registry_path, tmp.path().join("arbor").join("repos.json"));

        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
    }

    #[test]
    fn config_file_overrides_defaults() {
        let _lock = lock_env();
        let _tmp = isolated_config();

        save_config(&ConfigFile {
            git: GitSection {
                binary: Some("/opt/git/bin/git".into()),
                timeout_secs: Some(12),
            },
            terminal: TerminalSection {
                app: Some(TerminalApp::ITerm),
                agent_cli: Some("/usr/local/bin/agent".into()),
            },
            mcp: McpSection {
                settings_path: Some("/etc/agent/settings.json".into()),
            },
        })
        .unwrap();

        let config = ArborConfig::resolve(&CliOverrides::default()).unwrap();
        assert_eq!(config.git_binary, "/opt/git/bin/git");
        assert_eq!(config.git_timeout, Some(Duration::from_secs(12)));
        assert_eq!(config.terminal, Some(TerminalApp::ITerm));
        assert_eq!(config.agent_cli, "/usr/local/bin/agent");
        assert_eq!(config.mcp_settings, PathBuf::from("/etc/agent/settings.json"));

        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
    }

    #[test]
    fn env_overrides_file_and_cli_overrides_env() {
        let _lock = lock_env();
        let _tmp = isolated_config();

        save_config(&ConfigFile {
            git: GitSection {
                binary: Some("file-git".into()),
                timeout_secs: Some(5),
            },
            ..ConfigFile::default()
        })
        .unwrap();
        unsafe { std::env::set_var("ARBOR_GIT", "env-git") };
        unsafe { std::env::set_var("ARBOR_GIT_TIMEOUT", "9") };
        unsafe { std::env::set_var("ARBOR_TERMINAL", "ghostty") };

        let config = ArborConfig::resolve(&CliOverrides::default()).unwrap();
        assert_eq!(config.git_binary, "env-git");
        assert_eq!(config.git_timeout, Some(Duration::from_secs(9)));
        assert_eq!(config.terminal, Some(TerminalApp::Ghostty));

        let config = ArborConfig::resolve(&CliOverrides {
            git: Some("cli-git".into()),
            timeout_secs: Some(0),
            terminal: Some(TerminalApp::Terminal),
        })
        .unwrap();
        assert_eq!(config.git_binary, "cli-git");
        assert_eq!(config.git_timeout, None, "zero disables the timeout");
        assert_eq!(config.terminal, Some(TerminalApp::Terminal));

        for var in ["ARBOR_GIT", "ARBOR_GIT_TIMEOUT", "ARBOR_TERMINAL", "XDG_CONFIG_HOME"] {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn invalid_timeout_env_is_an_error() {
        let _lock = lock_env();
        let _tmp = isolated_config();
        unsafe { std::env::set_var("ARBOR_GIT_TIMEOUT", "soon") };

        let result = ArborConfig::resolve(&CliOverrides::default());

        unsafe { std::env::remove_var("ARBOR_GIT_TIMEOUT") };
        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };

        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("ARBOR_GIT_TIMEOUT"), "unexpected error: {msg}");
    }

    #[test]
    fn starter_config_round_trips() {
        let starter = ConfigFile::starter();
        let contents = toml::to_string_pretty(&starter).unwrap();
        let loaded: ConfigFile = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.git.binary.as_deref(), Some("git"));
        assert_eq!(loaded.terminal.app, starter.terminal.app);
        assert_eq!(loaded.mcp.settings_path.as_deref(), Some(DEFAULT_MCP_SETTINGS));
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("arbor/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
