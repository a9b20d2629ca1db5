//! Opening a terminal with an agent CLI running inside a worktree.
//!
//! Each supported terminal turns a `(directory, agent CLI)` pair into a
//! [`LaunchSpec`]: the program to spawn and its arguments. Ghostty is driven
//! through `open`, Terminal and iTerm2 through AppleScript via `osascript`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("unknown terminal {0:?} (expected ghostty, terminal or iterm)")]
    UnknownTerminal(String),

    #[error("failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Supported terminal applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalApp {
    Ghostty,
    Terminal,
    #[serde(rename = "iterm")]
    ITerm,
}

impl TerminalApp {
    pub const ALL: [Self; 3] = [Self::Ghostty, Self::Terminal, Self::ITerm];

    /// Application name as macOS knows it.
    pub fn app_name(self) -> &'static str {
        match self {
            Self::Ghostty => "Ghostty",
            Self::Terminal => "Terminal",
            Self::ITerm => "iTerm2",
        }
    }

    fn bundle_path(self) -> &'static str {
        match self {
            Self::Ghostty => "/Applications/Ghostty.app",
            Self::Terminal => "/System/Applications/Utilities/Terminal.app",
            Self::ITerm => "/Applications/iTerm.app",
        }
    }

    /// Terminals installed on this machine, in preference order.
    pub fn available() -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|app| Path::new(app.bundle_path()).exists())
            .collect()
    }

    /// `preferred` if installed, else the first installed terminal, else Terminal.
    pub fn resolve(preferred: Option<Self>) -> Self {
        let available = Self::available();
        match preferred {
            Some(app) if available.contains(&app) => app,
            _ => available.first().copied().unwrap_or(Self::Terminal),
        }
    }

    /// Build the process that opens this terminal in `dir` running `agent_cli`.
    pub fn launch_spec(self, dir: &Path, agent_cli: &str) -> LaunchSpec {
        let cli = expand_tilde(agent_cli);
        let command = format!(
            "cd {} && {}",
            shell_escape(&dir.to_string_lossy()),
            shell_escape(&cli.to_string_lossy())
        );

        match self {
            Self::Ghostty => LaunchSpec {
                program: "open".to_string(),
                args: vec![
                    "-a".to_string(),
                    "Ghostty".to_string(),
                    "--args".to_string(),
                    "-e".to_string(),
                    command,
                ],
            },
            Self::Terminal => osascript(format!(
                "tell application \"Terminal\"\n    activate\n    do script \"{}\"\nend tell",
                applescript_escape(&command)
            )),
            Self::ITerm => osascript(format!(
                "tell application \"iTerm2\"\n    activate\n    create window with default profile command \"{}\"\nend tell",
                applescript_escape(&command)
            )),
        }
    }
}

impl fmt::Display for TerminalApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ghostty => "ghostty",
            Self::Terminal => "terminal",
            Self::ITerm => "iterm",
        })
    }
}

impl FromStr for TerminalApp {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ghostty" => Ok(Self::Ghostty),
            "terminal" => Ok(Self::Terminal),
            "iterm" | "iterm2" => Ok(Self::ITerm),
            other => Err(LaunchError::UnknownTerminal(other.to_string())),
        }
    }
}

/// A process to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// Spawn the process without waiting for it.
    pub fn launch(&self) -> Result<(), LaunchError> {
        tracing::debug!(program = %self.program, args = ?self.args, "launching terminal");
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

fn osascript(script: String) -> LaunchSpec {
    LaunchSpec {
        program: "osascript".to_string(),
        args: vec!["-e".to_string(), script],
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

/// Wrap in single quotes, escaping any embedded single quotes.
fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
