//! Local status dashboard.
//!
//! Installs a periodic status refresher (systemd timer) that snapshots the mesh
//! client state into a web root, and a static HTTP server for that root. Both
//! run as independent daemons; the installer only checks that they started.

use super::services::install_packages;
use super::{FeatureAction, StepContext};
use crate::commands::services::Systemctl;
use anyhow::Result;

pub const WEB_ROOT: &str = "/var/lib/igel-router/www";
const REFRESH_SCRIPT: &str = "/usr/local/lib/igel-router/refresh-status";
const SERVER_UNIT: &str = "/etc/systemd/system/igel-dashboard.service";
const REFRESH_UNIT: &str = "/etc/systemd/system/igel-status.service";
const REFRESH_TIMER: &str = "/etc/systemd/system/igel-status.timer";

const REFRESH_SCRIPT_BODY: &str = r#"#!/bin/sh
# Managed by igel-router: refresh dashboard status snapshot
set -eu
out=/var/lib/igel-router/www
tmp="$out/.status.json.tmp"
if tailscale status --json > "$tmp" 2>/dev/null; then
    mv "$tmp" "$out/status.json"
else
    rm -f "$tmp"
    printf '{"BackendState":"Unavailable"}\n' > "$out/status.json"
fi
date -u +%Y-%m-%dT%H:%M:%SZ > "$out/updated"
"#;

const INDEX_HTML: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>IGEL Router</title></head>
<body>
<h1>IGEL Router</h1>
<p>Last refresh: <span id="updated">unknown</span></p>
<pre id="status">loading...</pre>
<script>
fetch('updated').then(r => r.text()).then(t => document.getElementById('updated').textContent = t);
fetch('status.json').then(r => r.json()).then(s => {
  const self = s.Self || {};
  const peers = Object.keys(s.Peer || {}).length;
  document.getElementById('status').textContent =
    `state: ${s.BackendState}\nhost: ${self.HostName || '-'}\nips: ${(self.TailscaleIPs || []).join(', ')}\npeers: ${peers}`;
});
</script>
</body></html>
"#;

fn server_unit(port: u16) -> String {
    format!(
        "# Managed by igel-router\n\
         [Unit]\n\
         Description=IGEL router status dashboard\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         ExecStart=/usr/bin/python3 -m http.server {port} --directory {root}\n\
         Restart=on-failure\n\
         DynamicUser=yes\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        port = port,
        root = WEB_ROOT,
    )
}

fn refresh_unit() -> String {
    format!(
        "# Managed by igel-router\n\
         [Unit]\n\
         Description=Refresh IGEL router dashboard status\n\
         \n\
         [Service]\n\
         Type=oneshot\n\
         ExecStart={}\n",
        REFRESH_SCRIPT
    )
}

const TIMER_UNIT: &str = "# Managed by igel-router
[Unit]
Description=Periodic IGEL router status refresh

[Timer]
OnBootSec=30s
OnUnitActiveSec=60s

[Install]
WantedBy=timers.target
";

pub struct Dashboard;

impl FeatureAction for Dashboard {
    fn install(&self, ctx: &StepContext) -> Result<()> {
        let host = ctx.host;
        let port = ctx.config.port("dashboard.port").unwrap_or(8088);

        install_packages(host, &["python3"])?;
        host.write_file(REFRESH_SCRIPT, REFRESH_SCRIPT_BODY, 0o755)?;
        host.write_file(&format!("{}/index.html", WEB_ROOT), INDEX_HTML, 0o644)?;

        let mut changed = host.write_file(SERVER_UNIT, &server_unit(port), 0o644)?;
        changed |= host.write_file(REFRESH_UNIT, &refresh_unit(), 0o644)?;
        changed |= host.write_file(REFRESH_TIMER, TIMER_UNIT, 0o644)?;
        if changed {
            host.run_checked(&Systemctl::daemon_reload())?;
        }

        host.run_checked(&Systemctl::enable_now(&[
            "igel-dashboard.service",
            "igel-status.timer",
        ]))?;

        // Brief "did it start" check; the daemon's own failures are its business
        if !host.run(&Systemctl::is_active("igel-dashboard.service"))?.success {
            tracing::warn!("Dashboard service is not active yet; check 'systemctl status igel-dashboard'");
        }
        tracing::info!("Dashboard on port {}", port);
        Ok(())
    }

    fn rollback(&self, ctx: &StepContext) -> Result<()> {
        let host = ctx.host;
        host.run_tolerant(&Systemctl::disable_now(&[
            "igel-dashboard.service",
            "igel-status.timer",
        ]));
        let mut removed = false;
        for path in [SERVER_UNIT, REFRESH_UNIT, REFRESH_TIMER, REFRESH_SCRIPT] {
            removed |= host.remove_file(path)?;
        }
        host.remove_file(&format!("{}/index.html", WEB_ROOT))?;
        if removed {
            host.run_tolerant(&Systemctl::daemon_reload());
        }
        Ok(())
    }
}
