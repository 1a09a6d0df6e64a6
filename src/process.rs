//! External command execution
//!
//! Runs a tool to completion, capturing stdout/stderr with trailing
//! whitespace trimmed. With a deadline, the child is killed when it elapses.

use crate::error::{Error, Result};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Human-readable exit status for error reasons
    pub fn status_text(&self) -> String {
        match self.status.code() {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// `program` followed by its arguments, for logs and error messages
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `program` with `args`, optionally bounded by `timeout`
///
/// A non-zero exit is not an error here; callers decide what failure means
/// for their tool. Failing to spawn is `Error::Io`, an elapsed deadline is
/// `Error::Timeout`.
pub async fn run(program: &str, args: &[&str], timeout: Option<Duration>) -> Result<CommandOutput> {
    info!(command = %command_line(program, args), "processing output");

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| Error::Timeout {
                command: command_line(program, args),
                timeout: limit,
            })??,
        None => command.output().await?,
    };

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        status: output.status,
    })
}
