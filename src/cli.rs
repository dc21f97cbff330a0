//! Command-line surface.
//!
//! Flags bind directly to configuration keys. The `--no-<feature>` switches
//! are generated from the feature registry at runtime so a new feature gets
//! its switch without touching this file.

use crate::config::{ConfigBuilder, ValueSource, feature_key, kebab};
use crate::error::{ProvisionError, Result};
use crate::features::FeatureRegistry;
use crate::features::builtin::{FULL_PRESET_EXCLUDES, MINIMAL_PRESET};
use clap::{Arg, ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Provision a thin client as a mesh-VPN subnet router
#[derive(Parser, Debug)]
#[command(name = "igel-router")]
#[command(about = "Provision a thin client as a mesh-VPN subnet router")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: log mutating host commands instead of running them.
    ///
    /// Read-only commands (link inspection, probes, status queries) still
    /// run so the preview is realistic. Files are still written below --root.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Filesystem root that generated files are written under
    #[arg(long, global = true, default_value = "/")]
    pub root: PathBuf,

    /// Write the run report as JSON to this file
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,

    /// Never prompt; unresolved keys keep their defaults
    #[arg(long, global = true)]
    pub non_interactive: bool,

    /// Enable only the minimal feature set
    #[arg(long, global = true, conflicts_with = "full")]
    pub minimal: bool,

    /// Enable every feature that can coexist
    #[arg(long, global = true)]
    pub full: bool,

    /// Enable a feature by id (repeatable, comma-separated)
    #[arg(long, global = true, value_delimiter = ',', value_name = "FEATURE")]
    pub enable: Vec<String>,

    #[command(flatten)]
    pub values: ValueFlags,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Flags carrying configuration values.
#[derive(clap::Args, Debug, Default)]
pub struct ValueFlags {
    /// Router hostname (also the mesh node name)
    #[arg(long, global = true)]
    pub hostname: Option<String>,

    /// Subnets to advertise, e.g. 192.168.1.0/24,10.0.0.0/8
    #[arg(long, global = true, value_name = "CIDR,CIDR,...")]
    pub routes: Option<String>,

    /// Pre-authentication key for the mesh VPN
    #[arg(long, global = true)]
    pub auth_key: Option<String>,

    /// Advertise the router as an exit node
    #[arg(long, global = true)]
    pub exit_node: bool,

    /// Control server URL (defaults to the local coordinator when enabled)
    #[arg(long, global = true)]
    pub login_server: Option<String>,

    /// Public domain of the self-hosted coordinator
    #[arg(long, global = true)]
    pub headscale_domain: Option<String>,

    /// Coordinator listen port
    #[arg(long, global = true)]
    pub headscale_port: Option<String>,

    /// Dashboard listen port
    #[arg(long, global = true)]
    pub dashboard_port: Option<String>,

    /// Wireless interface used by the Wi-Fi features
    #[arg(long, global = true)]
    pub wifi_interface: Option<String>,

    /// Access point SSID
    #[arg(long, global = true)]
    pub ap_ssid: Option<String>,

    /// Access point WPA2 passphrase
    #[arg(long, global = true)]
    pub ap_password: Option<String>,

    /// Access point channel (1-14)
    #[arg(long, global = true)]
    pub ap_channel: Option<String>,

    /// Upstream Wi-Fi network to join
    #[arg(long, global = true)]
    pub uplink_ssid: Option<String>,

    /// Upstream Wi-Fi passphrase
    #[arg(long, global = true)]
    pub uplink_password: Option<String>,
}

impl ValueFlags {
    fn pairs(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("device.hostname", self.hostname.as_deref()),
            ("network.routes", self.routes.as_deref()),
            ("vpn.authKey", self.auth_key.as_deref()),
            ("vpn.exitNode", self.exit_node.then_some("true")),
            ("vpn.loginServer", self.login_server.as_deref()),
            ("headscale.domain", self.headscale_domain.as_deref()),
            ("headscale.port", self.headscale_port.as_deref()),
            ("dashboard.port", self.dashboard_port.as_deref()),
            ("wifi.interface", self.wifi_interface.as_deref()),
            ("wifi.apSsid", self.ap_ssid.as_deref()),
            ("wifi.apPassword", self.ap_password.as_deref()),
            ("wifi.apChannel", self.ap_channel.as_deref()),
            ("wifi.uplinkSsid", self.uplink_ssid.as_deref()),
            ("wifi.uplinkPassword", self.uplink_password.as_deref()),
        ]
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Provision the appliance (the default)
    Install,
    /// Resolve the configuration and print the install plan
    Plan {
        #[arg(long)]
        json: bool,
    },
    /// List network interfaces and their classes
    Interfaces {
        #[arg(long)]
        json: bool,
    },
    /// Find the interface currently providing internet access
    DetectWan {
        #[arg(long)]
        json: bool,
    },
    /// Print the firewall rule set the configuration would produce
    Firewall,
    /// Wi-Fi management
    Wifi {
        #[command(subcommand)]
        action: WifiCommands,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum WifiCommands {
    /// List visible networks, strongest first
    Scan {
        #[arg(long)]
        json: bool,
    },
    /// Show device and connection state
    Status,
    /// Join a network as the uplink
    Connect {
        ssid: String,
        /// Passphrase (falls back to --uplink-password)
        #[arg(long)]
        password: Option<String>,
    },
    /// Start the access point from --ap-ssid/--ap-password
    ApStart,
    /// Stop the access point
    ApStop,
}

/// Parsed command line plus the registry-generated switches.
#[derive(Debug)]
pub struct Invocation {
    pub cli: Cli,
    /// Features switched off with `--no-<feature>`
    pub disabled: Vec<String>,
}

fn disable_flag(feature: &str) -> String {
    format!("no-{}", kebab(feature))
}

/// Full clap command, including one `--no-<feature>` per registry entry.
pub fn command(registry: &FeatureRegistry) -> clap::Command {
    let mut cmd = Cli::command();
    for f in registry.iter() {
        let flag = disable_flag(&f.id);
        cmd = cmd.arg(
            Arg::new(flag.clone())
                .long(flag)
                .action(ArgAction::SetTrue)
                .global(true)
                .help(format!("Do not install {}", f.summary)),
        );
    }
    cmd
}

/// Parse arguments. Help and version requests come back as `clap::Error`
/// too; the caller decides how to print and exit.
pub fn parse<I, T>(registry: &FeatureRegistry, args: I) -> std::result::Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches: ArgMatches = command(registry).try_get_matches_from(args)?;
    let cli = Cli::from_arg_matches(&matches)?;
    let disabled = registry
        .iter()
        .filter(|f| matches.get_flag(&disable_flag(&f.id)))
        .map(|f| f.id.clone())
        .collect();
    Ok(Invocation { cli, disabled })
}

impl Invocation {
    pub fn command(&self) -> Commands {
        self.cli.command.clone().unwrap_or(Commands::Install)
    }

    /// Apply the flag layer. Presets go first so per-feature switches win.
    pub fn apply_flags(&self, registry: &FeatureRegistry, builder: &mut ConfigBuilder) -> Result<()> {
        let cli = &self.cli;

        if cli.minimal || cli.full {
            for f in registry.iter() {
                let on = if cli.minimal {
                    MINIMAL_PRESET.contains(&f.id.as_str())
                } else {
                    !FULL_PRESET_EXCLUDES.contains(&f.id.as_str())
                };
                builder.set_raw(&feature_key(&f.id), &on.to_string(), ValueSource::Flag)?;
            }
        }

        for id in &cli.enable {
            if registry.get(id).is_none() {
                return Err(ProvisionError::UnknownFeature {
                    feature: id.clone(),
                    referenced_by: "--enable".to_string(),
                });
            }
            if self.disabled.contains(id) {
                return Err(ProvisionError::usage(format!(
                    "--enable {} and --{} contradict each other",
                    id,
                    disable_flag(id)
                )));
            }
            builder.set_raw(&feature_key(id), "true", ValueSource::Flag)?;
        }
        for id in &self.disabled {
            builder.set_raw(&feature_key(id), "false", ValueSource::Flag)?;
        }

        if cli.non_interactive {
            builder.set_raw("install.interactive", "false", ValueSource::Flag)?;
        }
        for (key, value) in cli.values.pairs() {
            if let Some(raw) = value {
                builder.set_raw(key, raw, ValueSource::Flag)?;
            }
        }
        Ok(())
    }
}
