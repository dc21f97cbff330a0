//! Mesh-VPN client configured as a subnet router.

use super::services::{install_packages, remove_packages};
use super::{FeatureAction, StepContext};
use crate::commands::network::SysctlReload;
use crate::commands::packages::CurlDownload;
use crate::commands::services::Systemctl;
use crate::commands::vpn::{TailscaleDown, TailscaleUp};
use crate::host::Host;
use anyhow::Result;

const SYSCTL_CONF: &str = "/etc/sysctl.d/90-igel-router.conf";
const KEYRING: &str = "/usr/share/keyrings/tailscale-archive-keyring.gpg";
const APT_LIST: &str = "/etc/apt/sources.list.d/tailscale.list";

const FORWARDING: &str = "\
# Managed by igel-router: subnet routing
net.ipv4.ip_forward = 1
net.ipv6.conf.all.forwarding = 1
";

/// Distribution id and codename from `os-release`.
pub fn distro(host: &Host) -> (String, String) {
    let text = std::fs::read_to_string(host.path("/etc/os-release")).unwrap_or_default();
    let field = |name: &str| {
        text.lines()
            .find_map(|l| l.strip_prefix(name).and_then(|v| v.strip_prefix('=')))
            .map(|v| v.trim_matches('"').to_string())
    };
    (
        field("ID").unwrap_or_else(|| "debian".to_string()),
        field("VERSION_CODENAME").unwrap_or_else(|| "bookworm".to_string()),
    )
}

/// Coordination server the client should log in to, if not the public one.
pub fn login_server(ctx: &StepContext) -> Option<String> {
    if let Some(server) = ctx.config.text("vpn.loginServer") {
        return Some(server.to_string());
    }
    if ctx.is_enabled("headscale") {
        let domain = ctx.config.text("headscale.domain")?;
        let port = ctx.config.port("headscale.port").unwrap_or(8080);
        return Some(format!("http://{}:{}", domain, port));
    }
    None
}

pub struct Tailscale;

impl Tailscale {
    fn add_repository(&self, host: &Host) -> Result<()> {
        let (id, codename) = distro(host);
        let base = format!("https://pkgs.tailscale.com/stable/{}", id);
        if !host.file_exists(KEYRING) {
            host.run_checked(&CurlDownload {
                url: format!("{}/{}.noarmor.gpg", base, codename),
                dest: host.path(KEYRING).display().to_string(),
            })?;
        }
        host.write_file(
            APT_LIST,
            &format!("deb [signed-by={}] {} {} main\n", KEYRING, base, codename),
            0o644,
        )?;
        Ok(())
    }
}

impl FeatureAction for Tailscale {
    fn install(&self, ctx: &StepContext) -> Result<()> {
        let host = ctx.host;

        if host.write_file(SYSCTL_CONF, FORWARDING, 0o644)? {
            host.run_checked(&SysctlReload)?;
        }

        self.add_repository(host)?;
        install_packages(host, &["tailscale"])?;
        host.run_checked(&Systemctl::enable_now(&["tailscaled"]))?;

        let auth_key = ctx.config.text("vpn.authKey").map(str::to_string);
        if auth_key.is_none() {
            tracing::warn!(
                "No auth key configured; run 'tailscale up' on the router to log in"
            );
            return Ok(());
        }

        let routes = ctx.config.list("network.routes").to_vec();
        let up = TailscaleUp {
            hostname: ctx
                .config
                .text("device.hostname")
                .unwrap_or("igel-router")
                .to_string(),
            auth_key,
            advertise_exit_node: ctx.config.flag("vpn.exitNode"),
            login_server: login_server(ctx),
            advertise_routes: routes,
        };
        host.run_checked(&up)?;
        tracing::info!(
            "Mesh VPN up; advertising {} route(s)",
            up.advertise_routes.len()
        );
        Ok(())
    }

    fn rollback(&self, ctx: &StepContext) -> Result<()> {
        let host = ctx.host;
        host.run_tolerant(&TailscaleDown);
        host.run_tolerant(&Systemctl::disable_now(&["tailscaled"]));
        remove_packages(host, &["tailscale"]);
        host.remove_file(APT_LIST)?;
        host.remove_file(KEYRING)?;
        if host.remove_file(SYSCTL_CONF)? {
            host.run_tolerant(&SysctlReload);
        }
        Ok(())
    }
}
