//! Configuration store
//!
//! Inputs are resolved from four layers in increasing priority: built-in
//! defaults, `IGEL_*` environment variables, explicit CLI flags, and (in
//! interactive mode) prompts for anything still at its default. The
//! [`ConfigBuilder`] collects the layers; [`ConfigBuilder::freeze`] validates and
//! returns an immutable [`ConfigStore`] that every feature reads from.
//!
//! # Key naming
//!
//! Keys are dotted (`device.hostname`, `features.cockpit.enabled`). The
//! environment variable for a key is `IGEL_` plus the key in upper snake case:
//! `vpn.authKey` → `IGEL_VPN_AUTH_KEY`.

use crate::error::{ProvisionError, Result};
use crate::prompt::Prompter;
use ipnet::IpNet;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Shape of a configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    /// Text that must never be logged or serialized in clear
    Secret,
    Bool,
    /// Comma-separated list
    List,
    Port,
}

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Text(String),
    Bool(bool),
    List(Vec<String>),
    Port(u16),
}

impl ConfigValue {
    /// Parse a raw string according to `kind`.
    pub fn parse(kind: ValueKind, raw: &str) -> std::result::Result<Self, String> {
        match kind {
            ValueKind::Text | ValueKind::Secret => Ok(Self::Text(raw.trim().to_string())),
            ValueKind::Bool => parse_bool(raw).map(Self::Bool),
            ValueKind::List => Ok(Self::List(parse_list(raw))),
            ValueKind::Port => match raw.trim().parse::<u16>() {
                Ok(0) | Err(_) => Err(format!("'{}' is not a port number (1-65535)", raw)),
                Ok(port) => Ok(Self::Port(port)),
            },
        }
    }

    /// Returns true if the value counts as "present" for required-key checks.
    pub fn is_present(&self) -> bool {
        match self {
            Self::Text(s) => !s.trim().is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Bool(_) | Self::Port(_) => true,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::List(items) => write!(f, "{}", items.join(",")),
            Self::Port(p) => write!(f, "{}", p),
        }
    }
}

/// Which layer supplied a value. Ordered by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Default,
    Env,
    Flag,
    Prompt,
}

/// Static description of one configuration key.
#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    pub key: &'static str,
    pub kind: ValueKind,
    pub default: Option<&'static str>,
    /// CLI flag that binds to this key
    pub flag: Option<&'static str>,
    /// Interactive prompt text; keys without one are never prompted
    pub prompt: Option<&'static str>,
    /// Only prompt when this feature will be installed
    pub feature: Option<&'static str>,
}

/// Built-in configuration keys (feature toggles are added per registry entry).
pub const KEYS: &[KeySpec] = &[
    KeySpec {
        key: "install.interactive",
        kind: ValueKind::Bool,
        default: Some("true"),
        flag: Some("--non-interactive"),
        prompt: None,
        feature: None,
    },
    KeySpec {
        key: "device.hostname",
        kind: ValueKind::Text,
        default: Some("igel-router"),
        flag: Some("--hostname"),
        prompt: Some("Hostname for this router"),
        feature: None,
    },
    KeySpec {
        key: "network.routes",
        kind: ValueKind::List,
        default: None,
        flag: Some("--routes"),
        prompt: Some("Subnets to advertise (comma-separated CIDRs, empty for none)"),
        feature: Some("tailscale"),
    },
    KeySpec {
        key: "vpn.authKey",
        kind: ValueKind::Secret,
        default: None,
        flag: Some("--auth-key"),
        prompt: Some("Tailscale auth key (empty to log in interactively later)"),
        feature: Some("tailscale"),
    },
    KeySpec {
        key: "vpn.exitNode",
        kind: ValueKind::Bool,
        default: Some("false"),
        flag: Some("--exit-node"),
        prompt: Some("Advertise this router as an exit node?"),
        feature: Some("tailscale"),
    },
    KeySpec {
        key: "vpn.loginServer",
        kind: ValueKind::Text,
        default: None,
        flag: Some("--login-server"),
        prompt: None,
        feature: None,
    },
    KeySpec {
        key: "headscale.domain",
        kind: ValueKind::Text,
        default: None,
        flag: Some("--headscale-domain"),
        prompt: Some("Public domain name for the Headscale server"),
        feature: Some("headscale"),
    },
    KeySpec {
        key: "headscale.port",
        kind: ValueKind::Port,
        default: Some("8080"),
        flag: Some("--headscale-port"),
        prompt: None,
        feature: None,
    },
    KeySpec {
        key: "dashboard.port",
        kind: ValueKind::Port,
        default: Some("8088"),
        flag: Some("--dashboard-port"),
        prompt: None,
        feature: None,
    },
    KeySpec {
        key: "wifi.interface",
        kind: ValueKind::Text,
        default: Some("wlan0"),
        flag: Some("--wifi-interface"),
        prompt: None,
        feature: None,
    },
    KeySpec {
        key: "wifi.apSsid",
        kind: ValueKind::Text,
        default: None,
        flag: Some("--ap-ssid"),
        prompt: Some("Access point SSID"),
        feature: Some("wifiAp"),
    },
    KeySpec {
        key: "wifi.apPassword",
        kind: ValueKind::Secret,
        default: None,
        flag: Some("--ap-password"),
        prompt: Some("Access point password (8+ characters)"),
        feature: Some("wifiAp"),
    },
    KeySpec {
        key: "wifi.apChannel",
        kind: ValueKind::Port,
        default: Some("6"),
        flag: Some("--ap-channel"),
        prompt: None,
        feature: None,
    },
    KeySpec {
        key: "wifi.uplinkSsid",
        kind: ValueKind::Text,
        default: None,
        flag: Some("--uplink-ssid"),
        prompt: Some("Upstream Wi-Fi network to join"),
        feature: Some("wifiUplink"),
    },
    KeySpec {
        key: "wifi.uplinkPassword",
        kind: ValueKind::Secret,
        default: None,
        flag: Some("--uplink-password"),
        prompt: Some("Upstream Wi-Fi password (empty for open networks)"),
        feature: Some("wifiUplink"),
    },
];

/// Key holding the enable flag of a feature.
pub fn feature_key(feature: &str) -> String {
    format!("features.{}.enabled", feature)
}

/// `camelCase` → `kebab-case` (feature ids to flag names).
pub fn kebab(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Environment variable bound to a key.
pub fn env_var_name(key: &str) -> String {
    let mut out = String::from("IGEL_");
    for c in key.chars() {
        match c {
            '.' | '-' => out.push('_'),
            c if c.is_ascii_uppercase() => {
                out.push('_');
                out.push(c);
            }
            c => out.push(c.to_ascii_uppercase()),
        }
    }
    out
}

/// Human-readable flag for a key, used in remediation hints.
pub fn flag_hint(key: &str) -> String {
    if let Some(flag) = KEYS.iter().find(|k| k.key == key).and_then(|k| k.flag) {
        return flag.to_string();
    }
    match key.strip_prefix("features.").and_then(|k| k.strip_suffix(".enabled")) {
        Some(feature) => format!("--enable {}", feature),
        None => format!("--{}", kebab(key.rsplit('.').next().unwrap_or(key))),
    }
}

fn parse_bool(raw: &str) -> std::result::Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("'{}' is not a boolean (true/false)", other)),
    }
}

/// Parse a comma/space-separated list, dropping empty entries.
fn parse_list(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Source of environment variables (process env in production, a map in tests).
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads the real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Dynamic key description (static keys plus one toggle per feature).
#[derive(Debug, Clone)]
struct Spec {
    kind: ValueKind,
    prompt: Option<String>,
    feature: Option<String>,
    /// Feature toggles are prompted before any value prompt
    toggle_for: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Resolved {
    value: ConfigValue,
    source: ValueSource,
}

/// Mutable configuration under construction.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    specs: BTreeMap<String, Spec>,
    values: BTreeMap<String, Resolved>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a builder with every static key at its default.
    pub fn new() -> Self {
        let mut builder = Self {
            specs: BTreeMap::new(),
            values: BTreeMap::new(),
        };
        for spec in KEYS {
            builder.specs.insert(
                spec.key.to_string(),
                Spec {
                    kind: spec.kind,
                    prompt: spec.prompt.map(str::to_string),
                    feature: spec.feature.map(str::to_string),
                    toggle_for: None,
                },
            );
            if let Some(default) = spec.default {
                // Static defaults are known-good
                if let Ok(value) = ConfigValue::parse(spec.kind, default) {
                    builder.values.insert(
                        spec.key.to_string(),
                        Resolved {
                            value,
                            source: ValueSource::Default,
                        },
                    );
                }
            }
        }
        builder
    }

    /// Register the enable toggle for a feature with its default.
    pub fn register_feature(&mut self, feature: &str, enabled_by_default: bool, summary: &str) {
        let key = feature_key(feature);
        self.specs.insert(
            key.clone(),
            Spec {
                kind: ValueKind::Bool,
                prompt: Some(format!("Install {}?", summary)),
                feature: None,
                toggle_for: Some(feature.to_string()),
            },
        );
        self.values.insert(
            key,
            Resolved {
                value: ConfigValue::Bool(enabled_by_default),
                source: ValueSource::Default,
            },
        );
    }

    /// Set a raw value from a given layer.
    ///
    /// A value only replaces one from an equal or lower-priority layer, so the
    /// order in which layers are applied does not change the outcome.
    pub fn set_raw(&mut self, key: &str, raw: &str, source: ValueSource) -> Result<()> {
        let spec = self
            .specs
            .get(key)
            .ok_or_else(|| ProvisionError::usage(format!("unknown configuration key '{}'", key)))?;
        let value = ConfigValue::parse(spec.kind, raw)
            .map_err(|e| ProvisionError::config(format!("{}: {}", key, e)))?;
        self.set(key, value, source);
        Ok(())
    }

    /// Set a typed value from a given layer (same precedence rule as `set_raw`).
    pub fn set(&mut self, key: &str, value: ConfigValue, source: ValueSource) {
        let replace = match self.values.get(key) {
            Some(existing) => source >= existing.source,
            None => true,
        };
        if replace {
            self.values
                .insert(key.to_string(), Resolved { value, source });
        }
    }

    /// Apply the environment layer: one `IGEL_*` variable per known key.
    pub fn apply_env(&mut self, env: &dyn EnvSource) -> Result<()> {
        let keys: Vec<String> = self.specs.keys().cloned().collect();
        for key in keys {
            if let Some(raw) = env.var(&env_var_name(&key)) {
                tracing::debug!("{} set from environment", key);
                self.set_raw(&key, &raw, ValueSource::Env)?;
            }
        }
        Ok(())
    }

    /// Source of the current value for `key`, if any.
    pub fn source(&self, key: &str) -> Option<ValueSource> {
        self.values.get(key).map(|r| r.source)
    }

    /// Current value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key).map(|r| &r.value)
    }

    /// Ids of features whose toggle is currently true.
    pub fn enabled_features(&self) -> BTreeSet<String> {
        self.specs
            .iter()
            .filter_map(|(key, spec)| spec.toggle_for.as_ref().map(|f| (key, f)))
            .filter(|(key, _)| matches!(self.get(key), Some(ConfigValue::Bool(true))))
            .map(|(_, feature)| feature.clone())
            .collect()
    }

    /// Returns true if interactive prompting is enabled.
    pub fn interactive(&self) -> bool {
        !matches!(self.get("install.interactive"), Some(ConfigValue::Bool(false)))
    }

    fn unresolved(&self, key: &str) -> bool {
        matches!(self.source(key), None | Some(ValueSource::Default))
    }

    /// Ask the operator about each feature toggle not set by flag or environment.
    pub fn prompt_feature_toggles(&mut self, prompter: &dyn Prompter) -> Result<()> {
        let toggles: Vec<(String, String)> = self
            .specs
            .iter()
            .filter(|(_, spec)| spec.toggle_for.is_some())
            .filter_map(|(key, spec)| spec.prompt.clone().map(|p| (key.clone(), p)))
            .collect();
        for (key, prompt) in toggles {
            if !self.unresolved(&key) {
                continue;
            }
            let current = matches!(self.get(&key), Some(ConfigValue::Bool(true)));
            let answer = prompter
                .confirm(&prompt, current)
                .map_err(|e| ProvisionError::usage(format!("prompt failed: {:#}", e)))?;
            self.set(&key, ConfigValue::Bool(answer), ValueSource::Prompt);
        }
        Ok(())
    }

    /// Prompt for every promptable key still unresolved that matters for `features`.
    pub fn prompt_values(
        &mut self,
        prompter: &dyn Prompter,
        features: &BTreeSet<String>,
    ) -> Result<()> {
        let pending: Vec<(String, Spec)> = self
            .specs
            .iter()
            .filter(|(_, spec)| spec.toggle_for.is_none() && spec.prompt.is_some())
            .filter(|(_, spec)| spec.feature.as_ref().is_none_or(|f| features.contains(f)))
            .map(|(key, spec)| (key.clone(), spec.clone()))
            .collect();

        for (key, spec) in pending {
            if !self.unresolved(&key) {
                continue;
            }
            let prompt = spec.prompt.as_deref().unwrap_or(key.as_str());
            let current = self.get(&key).map(|v| v.to_string());
            let answer = match spec.kind {
                ValueKind::Bool => prompter
                    .confirm(prompt, current.as_deref() == Some("true"))
                    .map(|b| b.to_string()),
                ValueKind::Secret => prompter.secret(prompt),
                _ => prompter.input(prompt, current.as_deref()),
            }
            .map_err(|e| ProvisionError::usage(format!("prompt failed: {:#}", e)))?;
            self.set_raw(&key, &answer, ValueSource::Prompt)?;
        }
        Ok(())
    }

    /// Validate and freeze. No mutation is possible afterwards.
    pub fn freeze(self) -> Result<ConfigStore> {
        let store = ConfigStore {
            secrets: self
                .specs
                .iter()
                .filter(|(_, s)| s.kind == ValueKind::Secret)
                .map(|(k, _)| k.clone())
                .collect(),
            values: self.values,
        };
        store.validate()?;
        Ok(store)
    }
}

/// Frozen, validated configuration snapshot.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    values: BTreeMap<String, Resolved>,
    secrets: BTreeSet<String>,
}

impl ConfigStore {
    fn validate(&self) -> Result<()> {
        let hostname = self.text("device.hostname").unwrap_or_default();
        validate_hostname(hostname)?;

        for route in self.list("network.routes") {
            route.parse::<IpNet>().map_err(|_| {
                ProvisionError::config(format!("network.routes: invalid CIDR '{}'", route))
            })?;
        }

        // Only the access point uses the passphrase; nothing else depends on it
        if let Some(password) = self
            .text("wifi.apPassword")
            .filter(|_| self.feature_enabled("wifiAp"))
        {
            if password.len() < 8 || password.len() > 63 {
                return Err(ProvisionError::config(
                    "wifi.apPassword: WPA2 passphrases are 8-63 characters",
                ));
            }
        }

        if let Some(ConfigValue::Port(channel)) = self.get("wifi.apChannel") {
            if !(1..=14).contains(channel) {
                return Err(ProvisionError::config(format!(
                    "wifi.apChannel: {} is not a 2.4 GHz channel (1-14)",
                    channel
                )));
            }
        }

        if let Some(server) = self.text("vpn.loginServer") {
            if !server.starts_with("https://") && !server.starts_with("http://") {
                return Err(ProvisionError::config(
                    "vpn.loginServer must start with http:// or https://",
                ));
            }
        }
        Ok(())
    }

    /// Raw typed value.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key).map(|r| &r.value)
    }

    /// Layer that supplied `key`.
    pub fn source(&self, key: &str) -> Option<ValueSource> {
        self.values.get(key).map(|r| r.source)
    }

    /// Non-empty text value.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(ConfigValue::Text(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Boolean value (absent = false).
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(ConfigValue::Bool(true)))
    }

    /// List value (absent = empty).
    pub fn list(&self, key: &str) -> &[String] {
        match self.get(key) {
            Some(ConfigValue::List(items)) => items,
            _ => &[],
        }
    }

    /// Port value.
    pub fn port(&self, key: &str) -> Option<u16> {
        match self.get(key) {
            Some(ConfigValue::Port(p)) => Some(*p),
            _ => None,
        }
    }

    /// Returns true if `key` is present and non-empty.
    pub fn is_present(&self, key: &str) -> bool {
        self.get(key).is_some_and(ConfigValue::is_present)
    }

    /// Returns true if the feature's enable flag is set.
    pub fn feature_enabled(&self, feature: &str) -> bool {
        self.flag(&feature_key(feature))
    }

    /// Returns true if the operator may be prompted.
    pub fn interactive(&self) -> bool {
        !matches!(self.get("install.interactive"), Some(ConfigValue::Bool(false)))
    }

    /// Key/value view with secrets masked, for plans and reports.
    pub fn redacted(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, r)| {
                let shown = if self.secrets.contains(k) && r.value.is_present() {
                    "********".to_string()
                } else {
                    r.value.to_string()
                };
                (k.clone(), shown)
            })
            .collect()
    }
}

impl Serialize for ConfigStore {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.redacted().serialize(serializer)
    }
}

/// RFC 1123 host label: 1-63 chars, alphanumeric and hyphens, no leading/trailing hyphen.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    let h = hostname.trim();
    if h.is_empty() || h.len() > 63 {
        return Err(ProvisionError::config(
            "device.hostname must be 1-63 characters long",
        ));
    }
    if h.starts_with('-') || h.ends_with('-') {
        return Err(ProvisionError::config(
            "device.hostname cannot start or end with a hyphen",
        ));
    }
    if !h.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ProvisionError::config(
            "device.hostname can only contain letters, numbers, and hyphens",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(env_var_name("device.hostname"), "IGEL_DEVICE_HOSTNAME");
        assert_eq!(env_var_name("vpn.authKey"), "IGEL_VPN_AUTH_KEY");
        assert_eq!(
            env_var_name("features.wifiAp.enabled"),
            "IGEL_FEATURES_WIFI_AP_ENABLED"
        );
    }

    #[test]
    fn test_kebab_and_flag_hint() {
        assert_eq!(kebab("networkPriority"), "network-priority");
        assert_eq!(flag_hint("device.hostname"), "--hostname");
        assert_eq!(flag_hint("features.cockpit.enabled"), "--enable cockpit");
    }

    #[test]
    fn test_defaults_are_applied() {
        let store = ConfigBuilder::new().freeze().expect("defaults are valid");
        assert_eq!(store.text("device.hostname"), Some("igel-router"));
        assert_eq!(store.port("headscale.port"), Some(8080));
        assert_eq!(store.source("device.hostname"), Some(ValueSource::Default));
        assert!(store.list("network.routes").is_empty());
    }

    #[test]
    fn test_flag_beats_env_regardless_of_order() {
        let mut builder = ConfigBuilder::new();
        builder
            .set_raw("device.hostname", "from-flag", ValueSource::Flag)
            .unwrap();
        builder
            .apply_env(&env(&[("IGEL_DEVICE_HOSTNAME", "from-env")]))
            .unwrap();
        let store = builder.freeze().unwrap();
        assert_eq!(store.text("device.hostname"), Some("from-flag"));
        assert_eq!(store.source("device.hostname"), Some(ValueSource::Flag));
    }

    #[test]
    fn test_env_beats_default() {
        let mut builder = ConfigBuilder::new();
        builder
            .apply_env(&env(&[("IGEL_NETWORK_ROUTES", "10.0.0.0/24, 192.168.1.0/24")]))
            .unwrap();
        let store = builder.freeze().unwrap();
        assert_eq!(
            store.list("network.routes"),
            &["10.0.0.0/24".to_string(), "192.168.1.0/24".to_string()]
        );
    }

    #[test]
    fn test_feature_toggles() {
        let mut builder = ConfigBuilder::new();
        builder.register_feature("cockpit", true, "Cockpit");
        builder.register_feature("docker", false, "Docker");
        assert_eq!(
            builder.enabled_features(),
            BTreeSet::from(["cockpit".to_string()])
        );
        builder
            .apply_env(&env(&[("IGEL_FEATURES_COCKPIT_ENABLED", "false")]))
            .unwrap();
        let store = builder.freeze().unwrap();
        assert!(!store.feature_enabled("cockpit"));
        assert!(!store.feature_enabled("docker"));
    }

    #[test]
    fn test_invalid_route_rejected_on_freeze() {
        let mut builder = ConfigBuilder::new();
        builder
            .set_raw("network.routes", "10.0.0.0/33", ValueSource::Flag)
            .unwrap();
        let err = builder.freeze().unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
    }

    #[test]
    fn test_ap_password_checked_only_for_access_point() {
        let short = |ap_enabled: bool| {
            let mut builder = ConfigBuilder::new();
            builder.register_feature("wifiAp", ap_enabled, "Wi-Fi AP");
            builder
                .set_raw("wifi.apPassword", "short", ValueSource::Env)
                .unwrap();
            builder.freeze()
        };
        assert!(short(false).is_ok());
        let err = short(true).unwrap_err();
        assert!(err.to_string().contains("wifi.apPassword"));
    }

    #[test]
    fn test_invalid_hostname_rejected() {
        assert!(validate_hostname("igel-router").is_ok());
        assert!(validate_hostname("-bad").is_err());
        assert!(validate_hostname("bad_name").is_err());
        assert!(validate_hostname("").is_err());
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let mut builder = ConfigBuilder::new();
        let err = builder
            .set_raw("headscale.port", "70000", ValueSource::Flag)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
    }

    #[test]
    fn test_unknown_key_is_usage_error() {
        let mut builder = ConfigBuilder::new();
        let err = builder
            .set_raw("nope.key", "x", ValueSource::Flag)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Usage(_)));
    }

    #[test]
    fn test_secrets_are_redacted() {
        let mut builder = ConfigBuilder::new();
        builder
            .set_raw("vpn.authKey", "tskey-secret", ValueSource::Flag)
            .unwrap();
        let store = builder.freeze().unwrap();
        let json = serde_json::to_string(&store).unwrap();
        assert!(!json.contains("tskey-secret"));
        assert_eq!(store.text("vpn.authKey"), Some("tskey-secret"));
    }

    #[test]
    fn test_empty_text_is_not_present() {
        let mut builder = ConfigBuilder::new();
        builder
            .set_raw("headscale.domain", "   ", ValueSource::Flag)
            .unwrap();
        let store = builder.freeze().unwrap();
        assert!(!store.is_present("headscale.domain"));
        assert!(store.is_present("device.hostname"));
    }
}
