//! Typed host command contracts.
//!
//! Instead of assembling raw string vectors at call sites, each host tool
//! invocation is a struct implementing [`HostCommand`]. The struct definition is
//! the contract: flag names live in exactly one place and argument mismatches
//! are caught at compile time.

use crate::command_runner::CommandLine;

/// Trait for typed host tool invocations.
///
/// # Contract
///
/// - `program()`: binary name resolved via `PATH` (e.g. `"apt-get"`).
/// - `to_args()`: arguments exactly as the tool expects them.
/// - `env_vars()`: extra environment for the child.
/// - `is_mutating()`: true if the command changes host state. Mutating
///   commands are skipped under `--dry-run`.
/// - `secrets()`: substrings that must never appear in logs.
pub trait HostCommand {
    fn program(&self) -> &'static str;

    fn to_args(&self) -> Vec<String>;

    fn env_vars(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn is_mutating(&self) -> bool;

    fn secrets(&self) -> Vec<String> {
        Vec::new()
    }

    /// Materialize into a runnable command line.
    fn to_command_line(&self) -> CommandLine {
        CommandLine {
            program: self.program().to_string(),
            args: self.to_args(),
            env: self.env_vars(),
            mutating: self.is_mutating(),
            secrets: self.secrets(),
        }
    }
}
