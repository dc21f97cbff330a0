//! Interface Inventory
//!
//! Enumerates host network interfaces and classifies each one by name. Only
//! local link inspection happens here (sysfs, `/proc/net/route`, `getifaddrs`);
//! no packets are sent.
//!
//! Classification is a swappable, ordered glob table: the first matching rule
//! wins and unmatched names are `Other`. Records are built fresh on every call
//! because USB modems come and go during installation.

use crate::types::{InterfaceClass, OperState};
use anyhow::{Context, Result};
use glob::Pattern;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};

/// One host network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    pub name: String,
    pub class: InterfaceClass,
    pub oper_state: OperState,
    pub has_ipv4: bool,
    pub ipv4_address: Option<Ipv4Addr>,
}

/// Raw link facts before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub name: String,
    pub oper_state: OperState,
    pub ipv4: Option<Ipv4Addr>,
}

impl LinkInfo {
    pub fn new(name: &str, oper_state: OperState, ipv4: Option<Ipv4Addr>) -> Self {
        Self {
            name: name.to_string(),
            oper_state,
            ipv4,
        }
    }
}

/// Where link information comes from.
pub trait LinkSource: Send + Sync {
    fn links(&self) -> Result<Vec<LinkInfo>>;

    /// Interface carrying the lowest-metric default route, if any.
    fn default_route_interface(&self) -> Result<Option<String>>;
}

// ============================================================================
// Classification
// ============================================================================

/// One `pattern → class` rule.
#[derive(Debug, Clone)]
pub struct ClassRule {
    pub pattern: Pattern,
    pub class: InterfaceClass,
}

/// Ordered classification rules; first match wins.
#[derive(Debug, Clone)]
pub struct ClassificationTable {
    rules: Vec<ClassRule>,
}

/// Default rules. Virtual links come first so `br-lan` or `wg0` never land in a
/// prioritized class; USB modems (`enx*`) must precede the generic `en*` rule.
const DEFAULT_RULES: &[(&str, InterfaceClass)] = &[
    ("lo", InterfaceClass::Other),
    ("tailscale*", InterfaceClass::Other),
    ("tun*", InterfaceClass::Other),
    ("wg*", InterfaceClass::Other),
    ("br*", InterfaceClass::Other),
    ("docker*", InterfaceClass::Other),
    ("veth*", InterfaceClass::Other),
    ("virbr*", InterfaceClass::Other),
    ("enx*", InterfaceClass::Cellular),
    ("usb*", InterfaceClass::Cellular),
    ("wwan*", InterfaceClass::Cellular),
    ("wwp*", InterfaceClass::Cellular),
    ("rmnet*", InterfaceClass::Cellular),
    ("ppp*", InterfaceClass::Cellular),
    ("eth*", InterfaceClass::Ethernet),
    ("en*", InterfaceClass::Ethernet),
    ("wlan*", InterfaceClass::Wireless),
    ("wl*", InterfaceClass::Wireless),
    ("wifi*", InterfaceClass::Wireless),
];

impl Default for ClassificationTable {
    fn default() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .filter_map(|(pat, class)| {
                Pattern::new(pat).ok().map(|pattern| ClassRule {
                    pattern,
                    class: *class,
                })
            })
            .collect();
        Self { rules }
    }
}

impl ClassificationTable {
    /// Build a table from `(glob, class)` pairs.
    pub fn from_rules(rules: &[(&str, InterfaceClass)]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|(pat, class)| {
                Pattern::new(pat)
                    .with_context(|| format!("invalid interface pattern '{}'", pat))
                    .map(|pattern| ClassRule {
                        pattern,
                        class: *class,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn classify(&self, name: &str) -> InterfaceClass {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(name))
            .map(|rule| rule.class)
            .unwrap_or(InterfaceClass::Other)
    }

    /// Globs that can produce `class`, in table order.
    ///
    /// Patterns shadowed by an earlier rule of a different class are still
    /// listed; the priority writer excludes them via `shadowing_patterns`.
    pub fn patterns_for(&self, class: InterfaceClass) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.class == class)
            .map(|r| r.pattern.as_str())
            .collect()
    }

    /// Globs of other classes listed before the last rule of `class`.
    pub fn shadowing_patterns(&self, class: InterfaceClass) -> Vec<&str> {
        let last = match self.rules.iter().rposition(|r| r.class == class) {
            Some(i) => i,
            None => return Vec::new(),
        };
        self.rules[..last]
            .iter()
            .filter(|r| r.class != class)
            .map(|r| r.pattern.as_str())
            .collect()
    }
}

// ============================================================================
// Inventory
// ============================================================================

/// Classifying view over a link source.
pub struct InterfaceInventory<'a> {
    source: &'a dyn LinkSource,
    table: &'a ClassificationTable,
}

impl<'a> InterfaceInventory<'a> {
    pub fn new(source: &'a dyn LinkSource, table: &'a ClassificationTable) -> Self {
        Self { source, table }
    }

    /// Current interfaces, sorted by name. Never cached.
    pub fn list(&self) -> Result<Vec<NetworkInterface>> {
        let mut interfaces: Vec<NetworkInterface> = self
            .source
            .links()?
            .into_iter()
            .map(|link| NetworkInterface {
                class: self.table.classify(&link.name),
                has_ipv4: link.ipv4.is_some(),
                ipv4_address: link.ipv4,
                oper_state: link.oper_state,
                name: link.name,
            })
            .collect();
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(interfaces)
    }

    pub fn default_route_interface(&self) -> Result<Option<String>> {
        self.source.default_route_interface()
    }

    pub fn table(&self) -> &ClassificationTable {
        self.table
    }
}

// ============================================================================
// Host implementation
// ============================================================================

/// Reads links from sysfs and procfs, addresses from `getifaddrs`.
#[derive(Debug, Clone)]
pub struct SysfsLinks {
    sys_class_net: PathBuf,
    proc_net_route: PathBuf,
}

impl Default for SysfsLinks {
    fn default() -> Self {
        Self::with_root(Path::new("/"))
    }
}

impl SysfsLinks {
    /// Read `sys/class/net` and `proc/net/route` below `root`.
    pub fn with_root(root: &Path) -> Self {
        Self {
            sys_class_net: root.join("sys/class/net"),
            proc_net_route: root.join("proc/net/route"),
        }
    }
}

impl LinkSource for SysfsLinks {
    fn links(&self) -> Result<Vec<LinkInfo>> {
        let addresses = ipv4_addresses();
        let entries = std::fs::read_dir(&self.sys_class_net)
            .with_context(|| format!("Failed to read {}", self.sys_class_net.display()))?;

        let mut links = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let oper_state = read_oper_state(&entry.path().join("operstate"));
            links.push(LinkInfo {
                ipv4: addresses.get(&name).copied(),
                name,
                oper_state,
            });
        }
        Ok(links)
    }

    fn default_route_interface(&self) -> Result<Option<String>> {
        let table = match std::fs::read_to_string(&self.proc_net_route) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.proc_net_route.display()));
            }
        };
        Ok(parse_default_route(&table))
    }
}

/// `unknown` and `dormant` count as down; only `up` is up.
fn read_oper_state(path: &Path) -> OperState {
    match std::fs::read_to_string(path) {
        Ok(s) if s.trim() == "up" => OperState::Up,
        _ => OperState::Down,
    }
}

/// First IPv4 address per interface.
fn ipv4_addresses() -> BTreeMap<String, Ipv4Addr> {
    let mut out = BTreeMap::new();
    let addrs = match nix::ifaddrs::getifaddrs() {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!("getifaddrs failed: {}", e);
            return out;
        }
    };
    for ifa in addrs {
        let Some(sin) = ifa.address.as_ref().and_then(|a| a.as_sockaddr_in()) else {
            continue;
        };
        let ip = *SocketAddrV4::from(*sin).ip();
        out.entry(ifa.interface_name).or_insert(ip);
    }
    out
}

/// Pick the up, default (`0.0.0.0/0`) route with the lowest metric from
/// `/proc/net/route` text.
pub fn parse_default_route(table: &str) -> Option<String> {
    const RTF_UP: u32 = 0x1;

    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 8 {
                return None;
            }
            let flags = u32::from_str_radix(cols[3], 16).ok()?;
            let metric: u32 = cols[6].parse().ok()?;
            let is_default = cols[1] == "00000000" && cols[7] == "00000000";
            (is_default && flags & RTF_UP != 0).then(|| (metric, cols[0].to_string()))
        })
        .min()
        .map(|(_, iface)| iface)
}
