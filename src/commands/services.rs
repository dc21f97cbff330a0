//! Service manager commands (`systemctl`).

use crate::host_command::HostCommand;
use strum::Display;

/// `systemctl` verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ServiceAction {
    Enable,
    Disable,
    Start,
    Stop,
    Restart,
    IsActive,
    DaemonReload,
}

/// Type-safe `systemctl` invocation.
#[derive(Debug, Clone)]
pub struct Systemctl {
    pub action: ServiceAction,
    pub units: Vec<String>,
    /// `--now` for enable/disable
    pub now: bool,
}

impl Systemctl {
    pub fn new(action: ServiceAction, units: &[&str]) -> Self {
        Self {
            action,
            units: units.iter().map(|u| u.to_string()).collect(),
            now: false,
        }
    }

    /// `systemctl enable --now <units>`
    pub fn enable_now(units: &[&str]) -> Self {
        Self {
            now: true,
            ..Self::new(ServiceAction::Enable, units)
        }
    }

    /// `systemctl disable --now <units>`
    pub fn disable_now(units: &[&str]) -> Self {
        Self {
            now: true,
            ..Self::new(ServiceAction::Disable, units)
        }
    }

    pub fn daemon_reload() -> Self {
        Self::new(ServiceAction::DaemonReload, &[])
    }

    pub fn is_active(unit: &str) -> Self {
        Self::new(ServiceAction::IsActive, &[unit])
    }
}

impl HostCommand for Systemctl {
    fn program(&self) -> &'static str {
        "systemctl"
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = vec![self.action.to_string()];
        if self.action == ServiceAction::IsActive {
            args.push("--quiet".to_string());
        }
        if self.now && matches!(self.action, ServiceAction::Enable | ServiceAction::Disable) {
            args.push("--now".to_string());
        }
        args.extend(self.units.iter().cloned());
        args
    }

    /// `is-active` is a read-only query; everything else changes unit state.
    fn is_mutating(&self) -> bool {
        self.action != ServiceAction::IsActive
    }
}
