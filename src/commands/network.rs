//! Network plumbing commands.
//!
//! - `PingProbe` for interface-bound reachability probes
//! - `NmcliReloadConf` after writing NetworkManager drop-ins
//! - `SysctlReload` after writing `/etc/sysctl.d` fragments

use crate::host_command::HostCommand;

// ============================================================================
// Interface-bound probe
// ============================================================================

/// `ping -c 1 -W <secs> -I <iface> <target>`
#[derive(Debug, Clone)]
pub struct PingProbe {
    pub interface: String,
    pub target: String,
    pub timeout_secs: u64,
}

impl HostCommand for PingProbe {
    fn program(&self) -> &'static str {
        "ping"
    }

    fn to_args(&self) -> Vec<String> {
        vec![
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            self.timeout_secs.max(1).to_string(),
            "-I".to_string(),
            self.interface.clone(),
            self.target.clone(),
        ]
    }

    fn is_mutating(&self) -> bool {
        false
    }
}

// ============================================================================
// NetworkManager reload
// ============================================================================

/// `nmcli general reload conf`
#[derive(Debug, Clone, Default)]
pub struct NmcliReloadConf;

impl HostCommand for NmcliReloadConf {
    fn program(&self) -> &'static str {
        "nmcli"
    }

    fn to_args(&self) -> Vec<String> {
        vec!["general".to_string(), "reload".to_string(), "conf".to_string()]
    }

    fn is_mutating(&self) -> bool {
        true
    }
}

// ============================================================================
// sysctl
// ============================================================================

/// `sysctl --system` (re-read every fragment).
#[derive(Debug, Clone, Default)]
pub struct SysctlReload;

impl HostCommand for SysctlReload {
    fn program(&self) -> &'static str {
        "sysctl"
    }

    fn to_args(&self) -> Vec<String> {
        vec!["--quiet".to_string(), "--system".to_string()]
    }

    fn is_mutating(&self) -> bool {
        true
    }
}
