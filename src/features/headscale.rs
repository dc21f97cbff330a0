//! Self-hosted VPN coordinator and its web UI.

use super::services::{install_packages, remove_packages};
use super::{FeatureAction, StepContext};
use crate::commands::containers::{DockerRemove, DockerRun};
use crate::commands::packages::CurlDownload;
use crate::commands::services::{ServiceAction, Systemctl};
use crate::commands::vpn::HeadscaleUserCreate;
use anyhow::{Context, Result};

pub const HEADSCALE_VERSION: &str = "0.23.0";
const HEADSCALE_CONFIG: &str = "/etc/headscale/config.yaml";
const HEADSCALE_DEB: &str = "/var/cache/igel-router/headscale.deb";
/// Coordinator user the router's own node registers under
pub const DEFAULT_USER: &str = "igel";

const HEADPLANE_CONFIG: &str = "/etc/headplane/config.yaml";
const HEADPLANE_IMAGE: &str = "ghcr.io/tale/headplane:latest";
pub const HEADPLANE_PORT: u16 = 3000;

/// Release asset architecture for this build.
fn deb_arch() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "arm64",
        "arm" => "armhf",
        _ => "amd64",
    }
}

pub fn render_headscale_config(domain: &str, port: u16) -> String {
    format!(
        "# Managed by igel-router\n\
         server_url: http://{domain}:{port}\n\
         listen_addr: 0.0.0.0:{port}\n\
         metrics_listen_addr: 127.0.0.1:9091\n\
         grpc_listen_addr: 127.0.0.1:50443\n\
         noise:\n  private_key_path: /var/lib/headscale/noise_private.key\n\
         prefixes:\n  v4: 100.64.0.0/10\n  v6: fd7a:115c:a1e0::/48\n\
         database:\n  type: sqlite\n  sqlite:\n    path: /var/lib/headscale/db.sqlite\n\
         derp:\n  urls:\n    - https://controlplane.tailscale.com/derpmap/default\n\
         dns:\n  magic_dns: true\n  base_domain: mesh.{domain}\n",
        domain = domain,
        port = port,
    )
}

pub struct Headscale;

impl FeatureAction for Headscale {
    fn install(&self, ctx: &StepContext) -> Result<()> {
        let host = ctx.host;
        let domain = ctx
            .config
            .text("headscale.domain")
            .context("headscale.domain is empty")?;
        let port = ctx.config.port("headscale.port").unwrap_or(8080);

        if !host.file_exists(HEADSCALE_DEB) {
            host.create_dir_all("/var/cache/igel-router")?;
            host.run_checked(&CurlDownload {
                url: format!(
                    "https://github.com/juanfont/headscale/releases/download/v{v}/headscale_{v}_linux_{arch}.deb",
                    v = HEADSCALE_VERSION,
                    arch = deb_arch()
                ),
                dest: host.path(HEADSCALE_DEB).display().to_string(),
            })?;
        }
        let deb = host.path(HEADSCALE_DEB).display().to_string();
        install_packages(host, &[deb.as_str()])?;

        let changed = host.write_file(
            HEADSCALE_CONFIG,
            &render_headscale_config(domain, port),
            0o644,
        )?;
        host.run_checked(&Systemctl::enable_now(&["headscale"]))?;
        if changed {
            host.run_checked(&Systemctl::new(ServiceAction::Restart, &["headscale"]))?;
        }

        let create = HeadscaleUserCreate {
            name: DEFAULT_USER.to_string(),
        };
        let output = host.run(&create)?;
        if !output.success && !HeadscaleUserCreate::already_exists(&output.stderr) {
            output.ensure_success("headscale users create")?;
        }
        tracing::info!("Coordinator serving http://{}:{}", domain, port);
        Ok(())
    }

    fn rollback(&self, ctx: &StepContext) -> Result<()> {
        let host = ctx.host;
        host.run_tolerant(&Systemctl::disable_now(&["headscale"]));
        remove_packages(host, &["headscale"]);
        host.remove_file(HEADSCALE_CONFIG)?;
        Ok(())
    }
}

pub struct Headplane;

impl FeatureAction for Headplane {
    fn install(&self, ctx: &StepContext) -> Result<()> {
        let host = ctx.host;
        let domain = ctx.config.text("headscale.domain").unwrap_or("localhost");
        let port = ctx.config.port("headscale.port").unwrap_or(8080);

        host.write_file(
            HEADPLANE_CONFIG,
            &format!(
                "# Managed by igel-router\nheadscale:\n  url: http://{}:{}\n  config_path: /etc/headscale/config.yaml\nserver:\n  host: 0.0.0.0\n  port: {}\n",
                domain, port, HEADPLANE_PORT
            ),
            0o644,
        )?;

        host.run_tolerant(&DockerRemove {
            name: "headplane".to_string(),
        });
        host.run_checked(&DockerRun {
            name: "headplane".to_string(),
            image: HEADPLANE_IMAGE.to_string(),
            ports: vec![format!("{0}:{0}", HEADPLANE_PORT)],
            volumes: vec![
                "/etc/headplane:/etc/headplane".to_string(),
                "/etc/headscale:/etc/headscale:ro".to_string(),
            ],
            ..Default::default()
        })?;
        Ok(())
    }

    fn rollback(&self, ctx: &StepContext) -> Result<()> {
        ctx.host.run_tolerant(&DockerRemove {
            name: "headplane".to_string(),
        });
        ctx.host.remove_file(HEADPLANE_CONFIG)?;
        Ok(())
    }
}
