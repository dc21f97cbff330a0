//! Pre-flight sanity checks for the runtime environment
//!
//! Before a real install this verifies:
//! - Running with root privileges (EUID 0)
//! - The host tools every feature shells out to are present
//!
//! Failures are reported as `ProvisionError::Environment` (exit 1) before
//! anything on the host is touched.

use crate::error::{ProvisionError, Result};
use crate::process_guard::CommandProcessGroup;
use std::process::Command;

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.is_root
    }

    /// One message covering every failed check.
    pub fn describe(&self) -> String {
        let mut problems = Vec::new();
        if !self.is_root {
            problems.push("root privileges required".to_string());
        }
        if !self.missing_binaries.is_empty() {
            let packages: Vec<&str> = self
                .missing_binaries
                .iter()
                .map(|b| package_for_binary(b))
                .collect();
            problems.push(format!(
                "missing {} (apt-get install {})",
                self.missing_binaries.join(", "),
                packages.join(" ")
            ));
        }
        problems.join("; ")
    }
}

/// Required runtime binaries
const REQUIRED_BINARIES: &[&str] = &[
    "apt-get",   // Package manager
    "systemctl", // Service manager
    "nft",       // Firewall
    "nmcli",     // Connection manager
    "curl",      // Repository keys and install scripts
    "ping",      // Interface-bound WAN checks
];

/// Check if a binary is available in PATH
fn binary_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .in_new_process_group()
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn package_for_binary(binary: &str) -> &'static str {
    match binary {
        "apt-get" => "apt",
        "systemctl" => "systemd",
        "nft" => "nftables",
        "nmcli" => "network-manager",
        "curl" => "curl",
        "ping" => "iputils-ping",
        _ => "unknown",
    }
}

/// Perform all sanity checks and return the result
pub fn verify_environment() -> SanityCheckResult {
    SanityCheckResult {
        missing_binaries: REQUIRED_BINARIES
            .iter()
            .filter(|b| !binary_exists(b))
            .map(|b| b.to_string())
            .collect(),
        is_root: nix::unistd::geteuid().is_root(),
    }
}

/// Verify the environment, failing with an `Environment` error.
pub fn run_preflight_checks() -> Result<()> {
    tracing::debug!("Running pre-flight sanity checks...");
    let result = verify_environment();
    if !result.is_ok() {
        return Err(ProvisionError::environment(result.describe()));
    }
    tracing::info!("Pre-flight checks passed");
    Ok(())
}
