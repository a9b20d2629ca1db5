//! External process invocation.
//!
//! Every git interaction goes through a [`ProcessRunner`]. The runner takes
//! a program and its arguments, waits for the process to exit and hands back
//! stdout on success. A non-zero exit becomes an [`ExecutionError`] carrying
//! the trimmed stderr so callers can surface it verbatim.

use std::ffi::{OsStr, OsString};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Errors produced when running an external program.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The program could not be started at all.
    #[error("failed to launch {program}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exited with a non-zero status.
    ///
    /// `message` is the trimmed stderr, or a generic description when the
    /// program wrote nothing to stderr.
    #[error("{message}")]
    Failed {
        command: String,
        code: Option<i32>,
        message: String,
    },

    /// The program did not finish within the configured timeout and was killed.
    #[error("{command} timed out after {}s", timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },

    /// A branch name was rejected before any process was started.
    #[error("invalid branch name: {0:?}")]
    InvalidBranchName(String),

    /// A path could not be made absolute before being handed to git.
    #[error("cannot resolve path {}", path.display())]
    InvalidPath {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExecutionError {
    /// The user-facing message, without any source chain.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Runs an external program and captures its output.
///
/// Implementations must be cheap to share: the worktree manager holds one
/// behind an `Arc` and may be driven from several tasks at once.
#[async_trait]
pub trait ProcessRunner: Send + Sync + std::fmt::Debug {
    /// Run `program` with `args`, returning stdout on a zero exit status.
    async fn run(&self, program: &str, args: &[OsString]) -> Result<String, ExecutionError>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    /// A runner that waits for processes indefinitely.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill and fail any invocation that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[OsString]) -> Result<String, ExecutionError> {
        let command_line = describe(program, args);
        tracing::debug!(command = %command_line, "running process");

        // kill_on_drop makes an abandoned (timed out) invocation reap its child.
        let pending = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, pending).await.map_err(|_| {
                ExecutionError::TimedOut {
                    command: command_line.clone(),
                    timeout,
                }
            })?,
            None => pending.await,
        };

        let output = result.map_err(|source| ExecutionError::Launch {
            program: program.to_string(),
            source,
        })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let code = output.status.code();
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(command = %command_line, ?code, stderr = %stderr.trim(), "process failed");
        Err(failure(command_line, code, &stderr))
    }
}

/// Build the error for a non-zero exit from the captured stderr.
pub fn failure(command: String, code: Option<i32>, stderr: &str) -> ExecutionError {
    let trimmed = stderr.trim();
    let message = if trimmed.is_empty() {
        match code {
            Some(code) => format!("{command} exited with status {code}"),
            None => format!("{command} was terminated by a signal"),
        }
    } else {
        trimmed.to_string()
    };
    ExecutionError::Failed {
        command,
        code,
        message,
    }
}

/// Render a command line for logs and error messages.
pub fn describe(program: &str, args: &[OsString]) -> String {
    std::iter::once(OsStr::new(program))
        .chain(args.iter().map(OsString::as_os_str))
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}


#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn failure_uses_trimmed_stderr() {
        let err = failure("git status".into(), Some(128), "  fatal: not a git repository\n\n");
        assert_eq!(err.to_string(), "fatal: not a git repository");
        assert!(matches!(err, ExecutionError::Failed { code: Some(128), .. }));
    }

    #[test]
    fn failure_falls_back_to_generic_message() {
        let err = failure("git worktree prune".into(), Some(1), "   \n");
        assert_eq!(err.to_string(), "git worktree prune exited with status 1");
    }

    #[test]
    fn describe_joins_program_and_args() {
        assert_eq!(
            describe("git", &args(&["-C", "/repos/app", "status"])),
            "git -C /repos/app status"
        );
    }

    #[tokio::test]
    async fn system_runner_captures_stdout() {
        let runner = SystemRunner::new();
        let out = runner
            .run("git", &args(&["--version"]))
            .await
            .expect("git --version failed");
        assert!(out.starts_with("git version"), "unexpected output: {out}");
    }

    #[tokio::test]
    async fn system_runner_reports_stderr_on_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = SystemRunner::new();
        let err = runner
            .run(
                "git",
                &[
                    OsString::from("-C"),
                    dir.path().join("missing").into_os_string(),
                    OsString::from("status"),
                ],
            )
            .await
            .expect_err("status in a missing directory should fail");

        match err {
            ExecutionError::Failed { message, code, .. } => {
                assert!(code.is_some());
                assert!(!message.is_empty());
                assert_eq!(message, message.trim());
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn system_runner_reports_launch_failure() {
        let runner = SystemRunner::new();
        let err = runner
            .run("arbor-definitely-not-a-binary", &[])
            .await
            .expect_err("missing binary should fail to launch");
        assert!(matches!(err, ExecutionError::Launch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_runner_times_out() {
        let runner = SystemRunner::new().with_timeout(Duration::from_millis(100));
        let err = runner
            .run("sleep", &args(&["5"]))
            .await
            .expect_err("sleep should time out");
        assert!(matches!(err, ExecutionError::TimedOut { .. }));
    }
}
