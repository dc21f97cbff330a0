//! Firewall Port Allocator
//!
//! The allow-list is recomputed from scratch after every run: the union of
//! ports of the features that ended `completed`, plus a fixed baseline. The
//! rendered nftables file flushes its own table first, so applying it replaces
//! whatever a previous run left behind. Completed gateway features add a
//! source-NAT rule on their uplink interface.

use crate::commands::firewall::NftApply;
use crate::config::ConfigStore;
use crate::features::FeatureRegistry;
use crate::host::Host;
use crate::types::{PortRule, Protocol};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;

pub const RULESET_PATH: &str = "/etc/igel-router/firewall.nft";
pub const TABLE_NAME: &str = "igel_router";
/// Mesh interface, trusted as a whole
pub const MESH_INTERFACE: &str = "tailscale0";
/// Management/remote-access port
pub const MANAGEMENT_PORT: PortRule = PortRule::tcp(22);

/// Computed allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowList {
    pub ports: BTreeSet<PortRule>,
    pub interfaces: BTreeSet<String>,
    /// Uplinks that forwarded traffic is masqueraded out of
    pub masquerade: BTreeSet<String>,
}

impl AllowList {
    /// Baseline only.
    pub fn baseline() -> Self {
        Self {
            ports: BTreeSet::from([MANAGEMENT_PORT]),
            interfaces: BTreeSet::from([MESH_INTERFACE.to_string()]),
            masquerade: BTreeSet::new(),
        }
    }

    /// Baseline plus the ports of `features`. Ids missing from the registry
    /// contribute nothing.
    pub fn for_features<'a>(
        registry: &FeatureRegistry,
        config: &ConfigStore,
        features: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut list = Self::baseline();
        for id in features {
            if let Some(feature) = registry.get(id) {
                list.ports.extend(feature.resolved_ports(config));
                if let Some(uplink) = feature.masquerade_key.as_deref().and_then(|k| config.text(k)) {
                    list.masquerade.insert(uplink.to_string());
                }
            }
        }
        list
    }

    pub fn allows(&self, rule: PortRule) -> bool {
        self.ports.contains(&rule)
    }
}

/// Render the rule set.
pub fn render(list: &AllowList) -> String {
    let mut out = String::new();
    out.push_str("#!/usr/sbin/nft -f\n");
    out.push_str("# Managed by igel-router; regenerated on every run\n\n");
    // Declaring the table first keeps the flush valid on a clean host
    let _ = writeln!(out, "table inet {}", TABLE_NAME);
    let _ = writeln!(out, "flush table inet {}\n", TABLE_NAME);
    let _ = writeln!(out, "table inet {} {{", TABLE_NAME);
    out.push_str("    chain input {\n");
    out.push_str("        type filter hook input priority filter; policy drop;\n");
    out.push_str("        ct state established,related accept\n");
    out.push_str("        ct state invalid drop\n");
    out.push_str("        iif \"lo\" accept\n");
    out.push_str("        meta l4proto { icmp, ipv6-icmp } accept\n");
    for iface in &list.interfaces {
        let _ = writeln!(out, "        iifname \"{}\" accept", iface);
    }
    for rule in &list.ports {
        let proto = match rule.protocol {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        };
        let _ = writeln!(out, "        {} dport {} accept", proto, rule.port);
    }
    out.push_str("    }\n");
    out.push_str("    chain forward {\n");
    out.push_str("        type filter hook forward priority filter; policy accept;\n");
    out.push_str("    }\n");
    out.push_str("    chain postrouting {\n");
    out.push_str("        type nat hook postrouting priority srcnat; policy accept;\n");
    for iface in &list.masquerade {
        let _ = writeln!(out, "        oifname \"{}\" masquerade", iface);
    }
    out.push_str("    }\n");
    out.push_str("}\n");
    out
}

/// Write the rule set, validate it and load it.
pub fn apply(host: &Host, list: &AllowList) -> Result<()> {
    host.write_file(RULESET_PATH, &render(list), 0o600)?;
    let path = host.path(RULESET_PATH).display().to_string();
    host.run_checked(&NftApply {
        path: path.clone(),
        check_only: true,
    })
    .context("rendered firewall rule set does not parse")?;
    host.run_checked(&NftApply {
        path,
        check_only: false,
    })?;
    tracing::info!(
        "Firewall applied: {}",
        list.ports
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}
