//! External command execution.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use shipwright_core::{ReleaseError, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// A program invocation: executable, arguments, working directory and timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    /// Timeout in seconds; 0 waits indefinitely.
    pub timeout_secs: u64,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            current_dir: None,
            timeout_secs: 0,
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// The command line as a single string, for logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Command line that was run.
    pub command: String,

    /// Exit code (0 = success, -1 if killed by a signal).
    pub exit_code: i32,

    pub stdout: String,
    pub stderr: String,

    pub duration_ms: u64,

    pub success: bool,
}

impl CommandOutput {
    /// Whether the command exited with code 0.
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Turn a non-zero exit into [`ReleaseError::Command`].
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            return Ok(self);
        }
        let detail = match self.stderr.trim() {
            "" => format!("exited with code {}", self.exit_code),
            stderr => format!("exited with code {}: {}", self.exit_code, stderr),
        };
        Err(ReleaseError::Command {
            command: self.command,
            detail,
        })
    }
}

/// Runs external programs and captures their output.
pub struct CommandRunner;

impl CommandRunner {
    /// Run `invocation` to completion. A non-zero exit is not an error here;
    /// check [`CommandOutput::passed`] or call [`CommandOutput::into_result`].
    pub async fn execute(invocation: &Invocation) -> Result<CommandOutput> {
        Self::execute_with_stdin(invocation, None).await
    }

    /// Like [`CommandRunner::execute`], feeding `stdin` to the child first.
    ///
    /// The stdin bytes are never logged.
    pub async fn execute_with_stdin(
        invocation: &Invocation,
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput> {
        let start = Instant::now();
        let command = invocation.display();
        let command_error = |detail: String| ReleaseError::Command {
            command: command.clone(),
            detail,
        };

        if invocation.program.is_empty() {
            return Err(command_error("empty program".to_string()));
        }

        debug!(%command, "running command");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| command_error(e.to_string()))?;

        if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(bytes)
                .await
                .map_err(|e| command_error(format!("writing stdin: {e}")))?;
            // Dropping the pipe closes it so the child sees EOF.
            drop(pipe);
        }

        let output = if invocation.timeout_secs > 0 {
            tokio::time::timeout(
                std::time::Duration::from_secs(invocation.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                command_error(format!(
                    "timed out after {} seconds",
                    invocation.timeout_secs
                ))
            })?
        } else {
            child.wait_with_output().await
        }
        .map_err(|e| command_error(e.to_string()))?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);

        debug!(%command, exit_code, duration_ms, "command finished");

        Ok(CommandOutput {
            command,
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            success: output.status.success(),
        })
    }

    /// Run `invocation` and fail on a non-zero exit.
    pub async fn run_checked(invocation: &Invocation) -> Result<CommandOutput> {
        Self::execute(invocation).await?.into_result()
    }
}
