use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{Error, Result};
use crate::log_sanitize::sanitize_output;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs one shell command to completion.
///
/// `Err` means the command could not be started at all; a command that ran and
/// failed comes back as `Ok` with a non-zero `status`.
pub trait CommandRunner {
    fn run(&self, command: &str) -> Result<CommandOutput>;
}

#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    pub dry_run: bool,
}

impl ShellRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        if self.dry_run {
            debug!("DRY-RUN: {command}");
            return Ok(CommandOutput::default());
        }

        // stdin is closed so a tool waiting on a prompt fails instead of hanging.
        let out = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::command(format!("spawn failed for '{command}': {e}")))?;

        for line in String::from_utf8_lossy(&out.stderr).lines() {
            let line = sanitize_output(line);
            if !line.is_empty() {
                debug!(command, "{line}");
            }
        }

        // Killed by a signal: no exit code.
        let status = out.status.code().unwrap_or(-1);
        debug!(command, status, "command finished");
        Ok(CommandOutput {
            status,
            output: String::from_utf8_lossy(&out.stdout).into_owned(),
        })
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        (**self).run(command)
    }
}
