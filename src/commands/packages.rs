//! Package manager and download commands.
//!
//! - `AptUpdate` / `AptInstall` / `AptRemove` for `apt-get`
//! - `CurlDownload` for fetching signing keys and release packages

use crate::host_command::HostCommand;

fn apt_env() -> Vec<(String, String)> {
    vec![("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())]
}

// ============================================================================
// apt-get update
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AptUpdate;

impl HostCommand for AptUpdate {
    fn program(&self) -> &'static str {
        "apt-get"
    }

    fn to_args(&self) -> Vec<String> {
        vec!["update".to_string(), "-qq".to_string()]
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        apt_env()
    }

    fn is_mutating(&self) -> bool {
        true
    }
}

// ============================================================================
// apt-get install
// ============================================================================

/// Install packages. Already-installed packages are a no-op.
#[derive(Debug, Clone)]
pub struct AptInstall {
    /// Package names or paths to local `.deb` files
    pub packages: Vec<String>,
}

impl AptInstall {
    pub fn new(packages: &[&str]) -> Self {
        Self {
            packages: packages.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl HostCommand for AptInstall {
    fn program(&self) -> &'static str {
        "apt-get"
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "install".to_string(),
            "-y".to_string(),
            "-qq".to_string(),
            "--no-install-recommends".to_string(),
        ];
        args.extend(self.packages.iter().cloned());
        args
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        apt_env()
    }

    fn is_mutating(&self) -> bool {
        true
    }
}

// ============================================================================
// apt-get remove
// ============================================================================

/// Remove packages. Packages that are not installed are ignored by apt.
#[derive(Debug, Clone)]
pub struct AptRemove {
    pub packages: Vec<String>,
    /// Also delete configuration files
    pub purge: bool,
}

impl AptRemove {
    pub fn new(packages: &[&str]) -> Self {
        Self {
            packages: packages.iter().map(|p| p.to_string()).collect(),
            purge: false,
        }
    }
}

impl HostCommand for AptRemove {
    fn program(&self) -> &'static str {
        "apt-get"
    }

    fn to_args(&self) -> Vec<String> {
        let verb = if self.purge { "purge" } else { "remove" };
        let mut args = vec![verb.to_string(), "-y".to_string(), "-qq".to_string()];
        args.extend(self.packages.iter().cloned());
        args
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        apt_env()
    }

    fn is_mutating(&self) -> bool {
        true
    }
}

// ============================================================================
// curl
// ============================================================================

/// Download a URL to a file, failing on HTTP errors.
#[derive(Debug, Clone)]
pub struct CurlDownload {
    pub url: String,
    pub dest: String,
}

impl HostCommand for CurlDownload {
    fn program(&self) -> &'static str {
        "curl"
    }

    fn to_args(&self) -> Vec<String> {
        vec![
            "-fsSL".to_string(),
            "--retry".to_string(),
            "3".to_string(),
            "-o".to_string(),
            self.dest.clone(),
            self.url.clone(),
        ]
    }

    fn is_mutating(&self) -> bool {
        true
    }
}
