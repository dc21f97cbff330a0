//! Connection-manager commands for Wi-Fi (`nmcli`).

use crate::host_command::HostCommand;
use strum::Display;

// ============================================================================
// Scan
// ============================================================================

/// `nmcli -t -f SSID,SIGNAL,SECURITY dev wifi list`
#[derive(Debug, Clone)]
pub struct NmcliWifiList {
    pub interface: String,
    /// Force a fresh scan instead of returning cached results
    pub rescan: bool,
}

impl HostCommand for NmcliWifiList {
    fn program(&self) -> &'static str {
        "nmcli"
    }

    fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-t", "-f", "SSID,SIGNAL,SECURITY", "dev", "wifi", "list"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push("ifname".to_string());
        args.push(self.interface.clone());
        if self.rescan {
            args.push("--rescan".to_string());
            args.push("yes".to_string());
        }
        args
    }

    fn is_mutating(&self) -> bool {
        false
    }
}

// ============================================================================
// Status
// ============================================================================

/// `nmcli -t -f DEVICE,TYPE,STATE,CONNECTION device status`
#[derive(Debug, Clone, Default)]
pub struct NmcliDeviceStatus;

impl HostCommand for NmcliDeviceStatus {
    fn program(&self) -> &'static str {
        "nmcli"
    }

    fn to_args(&self) -> Vec<String> {
        ["-t", "-f", "DEVICE,TYPE,STATE,CONNECTION", "device", "status"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn is_mutating(&self) -> bool {
        false
    }
}

// ============================================================================
// Connect (uplink)
// ============================================================================

/// `nmcli dev wifi connect <ssid> [password <pw>] ifname <iface> [name <con>] [hidden yes]`
#[derive(Debug, Clone)]
pub struct NmcliWifiConnect {
    pub interface: String,
    pub ssid: String,
    pub password: Option<String>,
    pub connection_name: Option<String>,
    pub hidden: bool,
}

impl HostCommand for NmcliWifiConnect {
    fn program(&self) -> &'static str {
        "nmcli"
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "dev".to_string(),
            "wifi".to_string(),
            "connect".to_string(),
            self.ssid.clone(),
        ];
        if let Some(ref pw) = self.password {
            args.push("password".to_string());
            args.push(pw.clone());
        }
        args.push("ifname".to_string());
        args.push(self.interface.clone());
        if let Some(ref name) = self.connection_name {
            args.push("name".to_string());
            args.push(name.clone());
        }
        if self.hidden {
            args.push("hidden".to_string());
            args.push("yes".to_string());
        }
        args
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn secrets(&self) -> Vec<String> {
        self.password.iter().cloned().collect()
    }
}

// ============================================================================
// Hotspot (access point)
// ============================================================================

/// `nmcli dev wifi hotspot` creates a shared-mode AP connection with DHCP/DNS.
#[derive(Debug, Clone)]
pub struct NmcliHotspot {
    pub interface: String,
    pub connection_name: String,
    pub ssid: String,
    pub password: String,
    pub channel: u16,
}

impl HostCommand for NmcliHotspot {
    fn program(&self) -> &'static str {
        "nmcli"
    }

    fn to_args(&self) -> Vec<String> {
        vec![
            "dev".to_string(),
            "wifi".to_string(),
            "hotspot".to_string(),
            "ifname".to_string(),
            self.interface.clone(),
            "con-name".to_string(),
            self.connection_name.clone(),
            "ssid".to_string(),
            self.ssid.clone(),
            "band".to_string(),
            "bg".to_string(),
            "channel".to_string(),
            self.channel.to_string(),
            "password".to_string(),
            self.password.clone(),
        ]
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn secrets(&self) -> Vec<String> {
        vec![self.password.clone()]
    }
}

// ============================================================================
// Connection up/down/delete
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionAction {
    Up,
    Down,
    Delete,
}

/// `nmcli connection <action> id <name>`
#[derive(Debug, Clone)]
pub struct NmcliConnection {
    pub action: ConnectionAction,
    pub id: String,
}

impl HostCommand for NmcliConnection {
    fn program(&self) -> &'static str {
        "nmcli"
    }

    fn to_args(&self) -> Vec<String> {
        vec![
            "connection".to_string(),
            self.action.to_string(),
            "id".to_string(),
            self.id.clone(),
        ]
    }

    fn is_mutating(&self) -> bool {
        true
    }
}
