//! Wi-Fi management over the connection manager.
//!
//! Thin wrappers over `nmcli` used by the `wifi` subcommands and by the
//! `wifiUplink` / `wifiAp` features.

use crate::commands::wifi::{
    ConnectionAction, NmcliConnection, NmcliDeviceStatus, NmcliHotspot, NmcliWifiConnect,
    NmcliWifiList,
};
use crate::host::Host;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Connection profile name for the access point.
pub const AP_CONNECTION: &str = "igel-ap";
/// Connection profile name for the upstream Wi-Fi client.
pub const UPLINK_CONNECTION: &str = "igel-uplink";

/// One scanned network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WifiNetwork {
    pub ssid: String,
    pub signal: u8,
    pub security: String,
}

/// One row of `nmcli device status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub device: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: String,
    pub connection: Option<String>,
}

/// Access point settings.
#[derive(Debug, Clone)]
pub struct ApSettings {
    pub interface: String,
    pub ssid: String,
    pub password: String,
    pub channel: u16,
}

/// Split one `nmcli -t` line on unescaped `:` and unescape `\:` and `\\`.
pub fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Parse `SSID:SIGNAL:SECURITY` lines.
///
/// Hidden networks (empty SSID) are dropped; duplicates keep the strongest
/// signal; the result is sorted by signal descending, then SSID.
pub fn parse_scan(output: &str) -> Vec<WifiNetwork> {
    let mut best: BTreeMap<String, WifiNetwork> = BTreeMap::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let fields = split_terse(line);
        if fields.len() < 3 {
            continue;
        }
        let ssid = fields[0].trim().to_string();
        let Ok(signal) = fields[1].trim().parse::<u8>() else {
            continue;
        };
        if ssid.is_empty() {
            continue;
        }
        let security = match fields[2].trim() {
            "" | "--" => "open".to_string(),
            s => s.to_string(),
        };
        let entry = WifiNetwork {
            ssid: ssid.clone(),
            signal,
            security,
        };
        match best.get(&ssid) {
            Some(existing) if existing.signal >= signal => {}
            _ => {
                best.insert(ssid, entry);
            }
        }
    }

    let mut networks: Vec<WifiNetwork> = best.into_values().collect();
    networks.sort_by(|a, b| b.signal.cmp(&a.signal).then_with(|| a.ssid.cmp(&b.ssid)));
    networks
}

/// Parse `DEVICE:TYPE:STATE:CONNECTION` lines.
pub fn parse_device_status(output: &str) -> Vec<DeviceState> {
    output
        .lines()
        .map(split_terse)
        .filter(|f| f.len() >= 4 && !f[0].is_empty())
        .map(|f| DeviceState {
            device: f[0].clone(),
            kind: f[1].clone(),
            state: f[2].clone(),
            connection: match f[3].as_str() {
                "" | "--" => None,
                c => Some(c.to_string()),
            },
        })
        .collect()
}

pub fn scan(host: &Host, interface: &str) -> Result<Vec<WifiNetwork>> {
    let output = host.run_checked(&NmcliWifiList {
        interface: interface.to_string(),
        rescan: true,
    })?;
    Ok(parse_scan(&output.stdout))
}

/// Status of Wi-Fi devices, optionally narrowed to one interface.
pub fn status(host: &Host, interface: Option<&str>) -> Result<Vec<DeviceState>> {
    let output = host.run_checked(&NmcliDeviceStatus)?;
    Ok(parse_device_status(&output.stdout)
        .into_iter()
        .filter(|d| d.kind == "wifi")
        .filter(|d| interface.is_none_or(|i| d.device == i))
        .collect())
}

/// Join an upstream network as the managed uplink profile.
pub fn connect(host: &Host, interface: &str, ssid: &str, password: Option<&str>) -> Result<()> {
    // Replacing the profile keeps re-runs from stacking duplicates
    host.run_tolerant(&NmcliConnection {
        action: ConnectionAction::Delete,
        id: UPLINK_CONNECTION.to_string(),
    });
    host.run_checked(&NmcliWifiConnect {
        interface: interface.to_string(),
        ssid: ssid.to_string(),
        password: password.filter(|p| !p.is_empty()).map(str::to_string),
        connection_name: Some(UPLINK_CONNECTION.to_string()),
        hidden: false,
    })?;
    tracing::info!("Connected {} to '{}'", interface, ssid);
    Ok(())
}

/// Drop the uplink profile. Safe when it never existed.
pub fn disconnect(host: &Host) {
    host.run_tolerant(&NmcliConnection {
        action: ConnectionAction::Down,
        id: UPLINK_CONNECTION.to_string(),
    });
    host.run_tolerant(&NmcliConnection {
        action: ConnectionAction::Delete,
        id: UPLINK_CONNECTION.to_string(),
    });
}

/// Start (or restart) the access point profile.
pub fn start_ap(host: &Host, settings: &ApSettings) -> Result<()> {
    host.run_tolerant(&NmcliConnection {
        action: ConnectionAction::Delete,
        id: AP_CONNECTION.to_string(),
    });
    host.run_checked(&NmcliHotspot {
        interface: settings.interface.clone(),
        connection_name: AP_CONNECTION.to_string(),
        ssid: settings.ssid.clone(),
        password: settings.password.clone(),
        channel: settings.channel,
    })?;
    tracing::info!(
        "Access point '{}' up on {} (channel {})",
        settings.ssid,
        settings.interface,
        settings.channel
    );
    Ok(())
}

/// Stop and delete the access point profile. Safe when it never existed.
pub fn stop_ap(host: &Host) {
    host.run_tolerant(&NmcliConnection {
        action: ConnectionAction::Down,
        id: AP_CONNECTION.to_string(),
    });
    host.run_tolerant(&NmcliConnection {
        action: ConnectionAction::Delete,
        id: AP_CONNECTION.to_string(),
    });
}
