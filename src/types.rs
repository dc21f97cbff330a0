//! Shared value types for the orchestrator
//!
//! Stringly-typed shell conventions are replaced with enums that provide
//! exhaustive matching and stable string forms for files and logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumIter, EnumString};

/// Classification of a host network interface.
///
/// Declaration order is routing preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InterfaceClass {
    Ethernet,
    Wireless,
    Cellular,
    Other,
}

impl InterfaceClass {
    /// Route metric for this class (lower = preferred). `Other` is never prioritized.
    pub const fn route_metric(self) -> Option<u32> {
        match self {
            Self::Ethernet => Some(100),
            Self::Wireless => Some(200),
            Self::Cellular => Some(300),
            Self::Other => None,
        }
    }

    /// Returns true if interfaces of this class take part in prioritization.
    pub const fn is_prioritized(self) -> bool {
        self.route_metric().is_some()
    }
}

/// Transport protocol for a firewall allow rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A `{protocol, port}` tuple to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortRule {
    pub protocol: Protocol,
    pub port: u16,
}

impl PortRule {
    pub const fn tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            port,
        }
    }

    pub const fn udp(port: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            port,
        }
    }
}

impl fmt::Display for PortRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

/// Link operational state as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperState {
    Up,
    #[default]
    Down,
}

/// Status of one feature in the installation ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Not attempted because a best-effort dependency failed
    Skipped,
    RolledBack,
    /// The compensating action itself failed; the feature may still be present
    RollbackFailed,
}
