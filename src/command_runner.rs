//! Host command execution
//!
//! [`CommandRunner`] is the single seam between feature actions and the host.
//! Production code uses [`SystemRunner`], which spawns every command in its own
//! process group and registers it with the global [`ChildRegistry`] so an
//! interrupted run never leaves an orphaned `apt-get` behind. Tests substitute
//! a recording fake.

use crate::host_command::HostCommand;
use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use anyhow::{Context, Result};
use std::fmt;
use std::process::{Command, Stdio};

/// A fully materialized command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Changes host state (skipped in dry-run mode)
    pub mutating: bool,
    /// Substrings masked when the command is displayed
    pub secrets: Vec<String>,
}

impl CommandLine {
    /// Ad-hoc command line for call sites without a typed contract.
    pub fn new(program: &str, args: &[&str], mutating: bool) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: Vec::new(),
            mutating,
            secrets: Vec::new(),
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        for secret in self.secrets.iter().filter(|s| !s.is_empty()) {
            rendered = rendered.replace(secret.as_str(), "********");
        }
        write!(f, "{}", rendered)
    }
}

/// Output from a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(code),
            success: false,
        }
    }

    /// Check if the command succeeded and return an error if not.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            let code = self.exit_code.unwrap_or(-1);
            anyhow::bail!(
                "{} failed (exit code {}): {}",
                context,
                code,
                self.stderr.trim()
            )
        }
    }
}

/// Executes command lines on (or on behalf of) the host.
pub trait CommandRunner: Send + Sync {
    fn run(&self, line: &CommandLine) -> Result<CommandOutput>;
}

impl dyn CommandRunner + '_ {
    /// Run a typed command.
    pub fn exec(&self, cmd: &dyn HostCommand) -> Result<CommandOutput> {
        self.run(&cmd.to_command_line())
    }

    /// Run a typed command and fail on non-zero exit.
    pub fn exec_checked(&self, cmd: &dyn HostCommand) -> Result<CommandOutput> {
        let line = cmd.to_command_line();
        let output = self.run(&line)?;
        output.ensure_success(&line.to_string())?;
        Ok(output)
    }
}

/// Runs commands on the real host.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, line: &CommandLine) -> Result<CommandOutput> {
        if self.dry_run && line.mutating {
            tracing::info!("[dry-run] would run: {}", line);
            return Ok(CommandOutput::ok(""));
        }

        tracing::debug!("run: {}", line);

        let mut cmd = Command::new(&line.program);
        cmd.args(&line.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();
        for (key, value) in &line.env {
            cmd.env(key, value);
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", line.program))?;
        let pid = child.id();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }

        let output = child.wait_with_output();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(pid);
        }

        let output = output.with_context(|| format!("Failed waiting for {}", line.program))?;
        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
        };

        if !result.success {
            tracing::debug!(
                "{} exited with {}",
                line.program,
                result.exit_code.unwrap_or(-1)
            );
        }
        Ok(result)
    }
}
