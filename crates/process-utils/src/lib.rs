//! Subprocess helpers shared across the workspace.
//!
//! - [`tokio_command`] builds a command that never opens a console window on
//!   Windows.
//! - [`OutputMode`] decides whether a child's output reaches the terminal.
//! - [`run_checked`] and [`output_checked`] turn a non-zero exit into a
//!   [`ProcessError`].
//! - [`wait_or_kill`] reaps a long-running child within a deadline.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Lines of stderr kept for the error message of a failed command.
const STDERR_TAIL_LINES: usize = 20;

pub type Result<T> = std::result::Result<T, ProcessError>;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}{}", exit_code_text(.code), stderr_suffix(.stderr))]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn exit_code_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl ProcessError {
    /// Exit code of a command that ran to completion and failed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code, .. } => *code,
            _ => None,
        }
    }
}

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn tokio_command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.no_window();
    cmd
}

/// Where a child's stdout and stderr go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Stdout is dropped; stderr is captured for logs and error messages.
    #[default]
    Discard,
    /// Both streams are inherited from this process.
    Forward,
}

impl OutputMode {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose { Self::Forward } else { Self::Discard }
    }

    /// Configure stdout/stderr of `cmd` for this mode.
    pub fn apply(self, cmd: &mut Command) {
        match self {
            Self::Discard => {
                cmd.stdout(Stdio::null()).stderr(Stdio::piped());
            }
            Self::Forward => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }
    }
}

/// `program arg1 arg2` for logs and errors.
pub fn describe(cmd: &Command) -> String {
    let std = cmd.as_std();
    std::iter::once(std.get_program())
        .chain(std.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `cmd` to completion with `mode`; a non-zero exit is an error.
pub async fn run_checked(cmd: &mut Command, mode: OutputMode) -> Result<()> {
    let command = describe(cmd);
    cmd.stdin(Stdio::null());
    mode.apply(cmd);
    debug!(%command, ?mode, "Running command");

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        command: command.clone(),
        source,
    })?;

    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("stderr: {}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        })
    });

    let status = child.wait().await.map_err(|source| ProcessError::Wait {
        command: command.clone(),
        source,
    })?;

    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    check_status(command, status, stderr)
}

/// Run `cmd` to completion and return its stdout; a non-zero exit is an error.
///
/// Stderr is always captured, whatever the caller's output mode.
pub async fn output_checked(cmd: &mut Command) -> Result<Vec<u8>> {
    let command = describe(cmd);
    debug!(%command, "Capturing command output");

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| ProcessError::Spawn {
            command: command.clone(),
            source,
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    check_status(command, output.status, stderr)?;
    Ok(output.stdout)
}

fn check_status(command: String, status: ExitStatus, stderr: String) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(ProcessError::NonZeroExit {
            command,
            code: status.code(),
            stderr,
        })
    }
}

/// Wait up to `timeout` for `child` to exit, killing it on overrun.
///
/// Returns the exit status, or `None` if the child had to be killed.
pub async fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => Ok(Some(status)),
        Ok(Err(source)) => Err(ProcessError::Wait {
            command: "child process".to_string(),
            source,
        }),
        Err(_) => {
            warn!(pid = ?child.id(), "Process did not exit in time; killing it");
            if let Err(e) = child.kill().await {
                warn!("Failed to kill process: {}", e);
            }
            Ok(None)
        }
    }
}
