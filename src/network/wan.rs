//! WAN Detector
//!
//! Finds the interface currently providing internet egress with a three-tier
//! fallback; each tier runs only if the previous one found nothing:
//!
//! 1. The default-route interface, confirmed by reaching any probe address.
//! 2. Every other IPv4-carrying, prioritizable interface, probed while bound to it.
//! 3. Conventional primary interface names that exist and carry IPv4, without a
//!    probe. This answer is reported as [`WanDetection::Unverified`].
//!
//! Nothing found is a normal result, not an error. Attempts are sequential with
//! a fixed per-probe timeout and no retries.

use crate::command_runner::CommandRunner;
use crate::commands::network::PingProbe;
use crate::network::inventory::{InterfaceInventory, NetworkInterface};
use crate::types::InterfaceClass;
use serde::Serialize;
use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

/// Well-known anycast resolvers, tried in order.
pub const PROBE_TARGETS: [&str; 3] = ["1.1.1.1:443", "8.8.8.8:443", "9.9.9.9:443"];

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Tier-3 names, in preference order.
pub const FALLBACK_NAMES: [&str; 5] = ["eth0", "enp1s0", "enp2s0", "wlan0", "usb0"];

/// Outcome of WAN detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WanDetection {
    /// A probe succeeded through this interface (tier 1 or 2)
    Verified { interface: String, tier: u8 },
    /// Configured but not yet verified (tier 3)
    Unverified { interface: String },
    /// Internet-dependent features may not be safely enabled
    NoneFound,
}

impl WanDetection {
    pub fn interface(&self) -> Option<&str> {
        match self {
            Self::Verified { interface, .. } | Self::Unverified { interface } => Some(interface),
            Self::NoneFound => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

impl fmt::Display for WanDetection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified { interface, tier } => {
                write!(f, "{} (verified, tier {})", interface, tier)
            }
            Self::Unverified { interface } => write!(f, "{} (unverified, tier 3)", interface),
            Self::NoneFound => write!(f, "none found"),
        }
    }
}

/// Reachability probe.
pub trait Prober: Send + Sync {
    /// Returns true if `target` answered within `timeout`. With `interface`
    /// set, the probe must leave through that interface.
    fn probe(&self, interface: Option<&str>, target: SocketAddr, timeout: Duration) -> bool;
}

/// Unbound probes use a TCP handshake via the routing table; bound probes use
/// `ping -I` through the command runner.
pub struct SystemProber {
    runner: Arc<dyn CommandRunner>,
}

impl SystemProber {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Prober for SystemProber {
    fn probe(&self, interface: Option<&str>, target: SocketAddr, timeout: Duration) -> bool {
        match interface {
            None => TcpStream::connect_timeout(&target, timeout).is_ok(),
            Some(iface) => {
                let ping = PingProbe {
                    interface: iface.to_string(),
                    target: target.ip().to_string(),
                    timeout_secs: timeout.as_secs(),
                };
                match self.runner.exec(&ping) {
                    Ok(output) => output.success,
                    Err(e) => {
                        tracing::debug!("probe via {} failed to run: {:#}", iface, e);
                        false
                    }
                }
            }
        }
    }
}

/// Three-tier WAN detector.
pub struct WanDetector<'a> {
    inventory: &'a InterfaceInventory<'a>,
    prober: &'a dyn Prober,
    targets: Vec<SocketAddr>,
    timeout: Duration,
}

impl<'a> WanDetector<'a> {
    pub fn new(inventory: &'a InterfaceInventory<'a>, prober: &'a dyn Prober) -> Self {
        Self {
            inventory,
            prober,
            targets: PROBE_TARGETS
                .iter()
                .filter_map(|t| t.parse().ok())
                .collect(),
            timeout: PROBE_TIMEOUT,
        }
    }

    fn reachable(&self, interface: Option<&str>) -> bool {
        self.targets
            .iter()
            .any(|target| self.prober.probe(interface, *target, self.timeout))
    }

    pub fn detect(&self) -> WanDetection {
        let interfaces = match self.inventory.list() {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("Interface inventory unavailable: {:#}", e);
                Vec::new()
            }
        };

        // Tier 1
        let default_iface = match self.inventory.default_route_interface() {
            Ok(iface) => iface,
            Err(e) => {
                tracing::warn!("Default route lookup failed: {:#}", e);
                None
            }
        };
        if let Some(ref iface) = default_iface {
            tracing::debug!("WAN tier 1: probing via default route on {}", iface);
            if self.reachable(None) {
                tracing::info!("WAN verified on default-route interface {}", iface);
                return WanDetection::Verified {
                    interface: iface.clone(),
                    tier: 1,
                };
            }
        }

        // Tier 2
        for candidate in interfaces.iter().filter(|i| tier2_candidate(i, default_iface.as_deref())) {
            tracing::debug!("WAN tier 2: probing bound to {}", candidate.name);
            if self.reachable(Some(&candidate.name)) {
                tracing::info!("WAN verified on {}", candidate.name);
                return WanDetection::Verified {
                    interface: candidate.name.clone(),
                    tier: 2,
                };
            }
        }

        // Tier 3
        for name in FALLBACK_NAMES {
            if interfaces.iter().any(|i| i.name == name && i.has_ipv4) {
                tracing::warn!("WAN falling back to {} without a connectivity check", name);
                return WanDetection::Unverified {
                    interface: name.to_string(),
                };
            }
        }

        tracing::warn!("No WAN interface found");
        WanDetection::NoneFound
    }
}

/// IPv4-carrying, not loopback/VPN/bridge, and not the default-route interface
/// that already failed tier 1.
fn tier2_candidate(iface: &NetworkInterface, failed_default: Option<&str>) -> bool {
    iface.has_ipv4 && iface.class != InterfaceClass::Other && Some(iface.name.as_str()) != failed_default
}
