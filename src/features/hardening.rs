//! Optional host hardening: unattended security upgrades and fail2ban.

use super::services::{install_packages, remove_packages};
use super::{FeatureAction, StepContext};
use crate::commands::services::{ServiceAction, Systemctl};
use anyhow::Result;

const AUTO_UPGRADES: &str = "/etc/apt/apt.conf.d/20auto-upgrades";
const JAIL: &str = "/etc/fail2ban/jail.d/igel-router.local";

const AUTO_UPGRADES_BODY: &str = "\
// Managed by igel-router
APT::Periodic::Update-Package-Lists \"1\";
APT::Periodic::Unattended-Upgrade \"1\";
";

const JAIL_BODY: &str = "\
# Managed by igel-router
[sshd]
enabled = true
maxretry = 5
bantime = 1h
";

pub struct Hardening;

impl FeatureAction for Hardening {
    fn install(&self, ctx: &StepContext) -> Result<()> {
        let host = ctx.host;
        install_packages(host, &["unattended-upgrades", "fail2ban"])?;
        host.write_file(AUTO_UPGRADES, AUTO_UPGRADES_BODY, 0o644)?;
        let jail_changed = host.write_file(JAIL, JAIL_BODY, 0o644)?;
        host.run_checked(&Systemctl::enable_now(&["fail2ban"]))?;
        if jail_changed {
            host.run_checked(&Systemctl::new(ServiceAction::Restart, &["fail2ban"]))?;
        }
        Ok(())
    }

    fn rollback(&self, ctx: &StepContext) -> Result<()> {
        let host = ctx.host;
        host.run_tolerant(&Systemctl::disable_now(&["fail2ban"]));
        host.remove_file(JAIL)?;
        host.remove_file(AUTO_UPGRADES)?;
        remove_packages(host, &["fail2ban"]);
        Ok(())
    }
}
