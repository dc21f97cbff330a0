//! The appliance's feature table, in declaration order.
//!
//! Declaration order is the resolver's tie-break, so it doubles as the
//! preferred install order for unrelated features.

use super::containers::{DOCKER, Portainer};
use super::dashboard::Dashboard;
use super::hardening::Hardening;
use super::headscale::{HEADPLANE_PORT, Headplane, Headscale};
use super::network_priority::NetworkPriority;
use super::services::PackageService;
use super::tailscale::Tailscale;
use super::wifi::{WifiAp, WifiUplink};
use super::{FeatureDescriptor, FeatureRegistry, PortSpec};
use crate::error::Result;
use crate::types::{PortRule, Protocol};

/// Mesh client's WireGuard port
pub const TAILSCALE_PORT: u16 = 41641;
pub const COCKPIT_PORT: u16 = 9090;

const COCKPIT: PackageService = PackageService {
    packages: &["cockpit"],
    units: &["cockpit.socket"],
};

/// Features enabled by `--minimal`.
pub const MINIMAL_PRESET: &[&str] = &["networkPriority", "tailscale"];

/// Features left out of `--full` (conflicts with the access point).
pub const FULL_PRESET_EXCLUDES: &[&str] = &["wifiUplink"];

pub fn descriptors() -> Vec<FeatureDescriptor> {
    vec![
        FeatureDescriptor::new("networkPriority", "interface route-metric priorities", NetworkPriority)
            .default_on(),
        FeatureDescriptor::new("tailscale", "the Tailscale mesh VPN subnet router", Tailscale)
            .default_on()
            .depends_on(&["networkPriority"])
            .requires(&["device.hostname"])
            .port(PortSpec::Fixed(PortRule::udp(TAILSCALE_PORT))),
        FeatureDescriptor::new("docker", "the Docker container runtime", DOCKER),
        FeatureDescriptor::new("headscale", "a self-hosted Headscale coordinator", Headscale)
            .requires(&["headscale.domain"])
            .port(PortSpec::Configured {
                key: "headscale.port",
                protocol: Protocol::Tcp,
                default: 8080,
            }),
        FeatureDescriptor::new("headplane", "the Headplane coordinator web UI", Headplane)
            .depends_on(&["headscale", "docker"])
            .port(PortSpec::Fixed(PortRule::tcp(HEADPLANE_PORT))),
        FeatureDescriptor::new("portainer", "the Portainer container UI", Portainer)
            .depends_on(&["docker"])
            .port(PortSpec::Fixed(PortRule::tcp(super::containers::PORTAINER_PORT))),
        FeatureDescriptor::new("cockpit", "the Cockpit system-admin UI", COCKPIT)
            .default_on()
            .port(PortSpec::Fixed(PortRule::tcp(COCKPIT_PORT))),
        FeatureDescriptor::new("dashboard", "the local status dashboard", Dashboard)
            .default_on()
            .depends_on(&["tailscale"])
            .port(PortSpec::Configured {
                key: "dashboard.port",
                protocol: Protocol::Tcp,
                default: 8088,
            }),
        FeatureDescriptor::new("wifiUplink", "Wi-Fi uplink (join an upstream network)", WifiUplink)
            .depends_on(&["networkPriority"])
            .conflicts_with(&["wifiAp"])
            .requires(&["wifi.uplinkSsid"])
            .masquerade_via("wifi.interface"),
        FeatureDescriptor::new("wifiAp", "a Wi-Fi access point", WifiAp)
            .depends_on(&["networkPriority"])
            .conflicts_with(&["wifiUplink"])
            .requires(&["wifi.apSsid", "wifi.apPassword"])
            .port(PortSpec::Fixed(PortRule::udp(53)))
            .port(PortSpec::Fixed(PortRule::udp(67))),
        FeatureDescriptor::new("hardening", "unattended upgrades and fail2ban", Hardening)
            .default_on()
            .best_effort(),
    ]
}

/// The built-in registry.
pub fn registry() -> Result<FeatureRegistry> {
    FeatureRegistry::new(descriptors())
}
