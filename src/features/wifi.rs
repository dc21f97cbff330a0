//! Wi-Fi uplink ("coffee shop" mode) and Wi-Fi access point features.
//!
//! In uplink mode the radio is the WAN and the wired side is shared through
//! it: forwarding is switched on here and the firewall masquerades out of the
//! radio. The access point must never take over the radio carrying the WAN.

use super::{FeatureAction, StepContext};
use crate::commands::network::SysctlReload;
use crate::host::Host;
use crate::network::wifi::{self, ApSettings};
use anyhow::{Context, Result, bail};

const GATEWAY_SYSCTL_CONF: &str = "/etc/sysctl.d/90-igel-gateway.conf";

const GATEWAY_FORWARDING: &str = "\
# Managed by igel-router: Wi-Fi uplink gateway
net.ipv4.ip_forward = 1
";

fn interface(ctx: &StepContext) -> String {
    ctx.config
        .text("wifi.interface")
        .unwrap_or("wlan0")
        .to_string()
}

/// Refuse to turn `radio` into an access point while it carries the WAN.
pub fn ensure_not_wan(host: &Host, radio: &str) -> Result<()> {
    if host.detect_wan().interface() == Some(radio) {
        bail!(
            "{} carries the WAN; an access point on it would cut the uplink (pick another radio with --wifi-interface)",
            radio
        );
    }
    Ok(())
}

pub struct WifiUplink;

impl FeatureAction for WifiUplink {
    fn install(&self, ctx: &StepContext) -> Result<()> {
        if ctx.host.write_file(GATEWAY_SYSCTL_CONF, GATEWAY_FORWARDING, 0o644)? {
            ctx.host.run_checked(&SysctlReload)?;
        }
        let ssid = ctx
            .config
            .text("wifi.uplinkSsid")
            .context("wifi.uplinkSsid is empty")?;
        wifi::connect(
            ctx.host,
            &interface(ctx),
            ssid,
            ctx.config.text("wifi.uplinkPassword"),
        )
    }

    fn rollback(&self, ctx: &StepContext) -> Result<()> {
        wifi::disconnect(ctx.host);
        if ctx.host.remove_file(GATEWAY_SYSCTL_CONF)? {
            ctx.host.run_tolerant(&SysctlReload);
        }
        Ok(())
    }
}

pub struct WifiAp;

impl FeatureAction for WifiAp {
    fn preflight(&self, ctx: &StepContext) -> Result<()> {
        ensure_not_wan(ctx.host, &interface(ctx))
    }

    fn install(&self, ctx: &StepContext) -> Result<()> {
        let settings = ApSettings {
            interface: interface(ctx),
            ssid: ctx
                .config
                .text("wifi.apSsid")
                .context("wifi.apSsid is empty")?
                .to_string(),
            password: ctx
                .config
                .text("wifi.apPassword")
                .context("wifi.apPassword is empty")?
                .to_string(),
            channel: ctx.config.port("wifi.apChannel").unwrap_or(6),
        };
        wifi::start_ap(ctx.host, &settings)
    }

    fn rollback(&self, ctx: &StepContext) -> Result<()> {
        wifi::stop_ap(ctx.host);
        Ok(())
    }
}
