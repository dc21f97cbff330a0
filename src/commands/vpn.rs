//! Mesh-VPN client and coordinator control commands.
//!
//! - `TailscaleUp` / `TailscaleDown` for the `tailscale` CLI
//! - `HeadscaleUserCreate` for the coordinator's user namespace

use crate::host_command::HostCommand;

// ============================================================================
// tailscale up
// ============================================================================

/// Bring the node onto the mesh, advertising subnet routes.
///
/// Uses `--reset` so re-running with different routes replaces the previous
/// advertisement instead of failing on unspecified non-default flags.
#[derive(Debug, Clone, Default)]
pub struct TailscaleUp {
    pub hostname: String,
    pub auth_key: Option<String>,
    pub advertise_routes: Vec<String>,
    pub advertise_exit_node: bool,
    /// Custom coordination server (self-hosted coordinator)
    pub login_server: Option<String>,
}

impl HostCommand for TailscaleUp {
    fn program(&self) -> &'static str {
        "tailscale"
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "up".to_string(),
            "--reset".to_string(),
            format!("--hostname={}", self.hostname),
        ];
        if !self.advertise_routes.is_empty() {
            args.push(format!(
                "--advertise-routes={}",
                self.advertise_routes.join(",")
            ));
        }
        if self.advertise_exit_node {
            args.push("--advertise-exit-node".to_string());
        }
        if let Some(ref server) = self.login_server {
            args.push(format!("--login-server={}", server));
        }
        if let Some(ref key) = self.auth_key {
            args.push(format!("--authkey={}", key));
        }
        args
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn secrets(&self) -> Vec<String> {
        self.auth_key.iter().cloned().collect()
    }
}

// ============================================================================
// tailscale down
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct TailscaleDown;

impl HostCommand for TailscaleDown {
    fn program(&self) -> &'static str {
        "tailscale"
    }

    fn to_args(&self) -> Vec<String> {
        vec!["down".to_string()]
    }

    fn is_mutating(&self) -> bool {
        true
    }
}

// ============================================================================
// headscale users create
// ============================================================================

/// Create a coordinator user. Callers treat "already exists" as success.
#[derive(Debug, Clone)]
pub struct HeadscaleUserCreate {
    pub name: String,
}

impl HeadscaleUserCreate {
    /// Returns true if a failed run only means the user was already there.
    pub fn already_exists(stderr: &str) -> bool {
        stderr.to_ascii_lowercase().contains("already exists")
    }
}

impl HostCommand for HeadscaleUserCreate {
    fn program(&self) -> &'static str {
        "headscale"
    }

    fn to_args(&self) -> Vec<String> {
        vec!["users".to_string(), "create".to_string(), self.name.clone()]
    }

    fn is_mutating(&self) -> bool {
        true
    }
}
